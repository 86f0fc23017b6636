//! Container image references

use serde::Serialize;
use std::fmt;

use crate::error::{ShipError, ShipResult};

/// Tag every successful publish moves forward
pub const LATEST_TAG: &str = "latest";

/// Registry used by docker when the repository has no host component
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// `<registry>/<name>:<tag>`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: &str, tag: &str) -> ShipResult<Self> {
        let reference = format!("{}:{}", repository, tag);
        validate_repository(repository).map_err(|reason| ShipError::InvalidImageRef {
            reference: reference.clone(),
            reason,
        })?;
        if !is_valid_tag(tag) {
            return Err(ShipError::InvalidImageRef {
                reference,
                reason: format!("`{}` is not a valid tag", tag),
            });
        }
        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Parse `repo[:tag]`; a missing tag means `latest`
    pub fn parse(reference: &str) -> ShipResult<Self> {
        if reference.contains('@') {
            return Err(ShipError::InvalidImageRef {
                reference: reference.to_string(),
                reason: "digest references are not supported".to_string(),
            });
        }
        let last_slash = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
        match reference[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                Self::new(&reference[..split], &reference[split + 1..])
            }
            None => Self::new(reference, LATEST_TAG),
        }
    }

    pub fn latest(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            tag: LATEST_TAG.to_string(),
        }
    }

    /// Host `docker login` has to authenticate against
    pub fn registry_host(&self) -> &str {
        registry_host(&self.repository)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Registry host of a repository, following docker's own resolution rule
pub fn registry_host(repository: &str) -> &str {
    match repository.split_once('/') {
        Some((first, _))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            first
        }
        _ => DEFAULT_REGISTRY,
    }
}

fn validate_repository(repository: &str) -> Result<(), String> {
    if repository.is_empty() {
        return Err("repository is empty".to_string());
    }
    if repository.starts_with('/') || repository.ends_with('/') || repository.contains("//") {
        return Err("repository has an empty path component".to_string());
    }
    if repository.chars().any(char::is_whitespace) {
        return Err("repository contains whitespace".to_string());
    }
    let path = match repository.split_once('/') {
        Some((host, rest)) if registry_host(repository) == host => rest,
        _ => repository,
    };
    let valid = path.chars().all(|c| {
        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-' | '/')
    });
    if !valid {
        return Err("repository path must be lowercase alphanumerics, '.', '_', '-' or '/'".to_string());
    }
    Ok(())
}

/// Docker tag grammar: `[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}`
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    tag.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Immutable identifier of one pipeline run, used as the image tag
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BuildId(String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> ShipResult<Self> {
        let id = id.into();
        if !is_valid_tag(&id) || id == LATEST_TAG {
            return Err(ShipError::InvalidBuildId(id));
        }
        Ok(Self(id))
    }

    /// Identifier for runs outside CI
    pub fn local() -> Self {
        Self(format!("local-{}", chrono::Utc::now().format("%Y%m%d%H%M%S")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output of a successful image build
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BuiltImage {
    pub reference: ImageRef,
    /// Content digest reported by `docker image inspect`
    pub image_id: String,
}

/// Output of a successful publish
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PublishedImage {
    pub versioned: ImageRef,
    pub latest: ImageRef,
    pub image_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_registry_port() {
        let image = ImageRef::parse("localhost:5000/team/app:42").unwrap();
        assert_eq!(image.repository, "localhost:5000/team/app");
        assert_eq!(image.tag, "42");
        assert_eq!(image.registry_host(), "localhost:5000");
    }

    #[test]
    fn test_parse_defaults_to_latest() {
        let image = ImageRef::parse("registry.example/app").unwrap();
        assert_eq!(image.tag, "latest");
        assert_eq!(image.to_string(), "registry.example/app:latest");
    }

    #[test]
    fn test_registry_host_resolution() {
        assert_eq!(registry_host("myacr.azurecr.io/fastapi"), "myacr.azurecr.io");
        assert_eq!(registry_host("library/python"), DEFAULT_REGISTRY);
        assert_eq!(registry_host("python"), DEFAULT_REGISTRY);
        assert_eq!(registry_host("localhost/app"), "localhost");
    }

    #[test]
    fn test_invalid_references() {
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("registry.example/App:1").is_err());
        assert!(ImageRef::parse("app@sha256:abc").is_err());
        assert!(ImageRef::new("registry.example/app", "-bad").is_err());
        assert!(ImageRef::new("registry.example//app", "1").is_err());
    }

    #[test]
    fn test_latest_keeps_repository() {
        let image = ImageRef::new("registry.example/app", "42").unwrap();
        assert_eq!(image.latest().to_string(), "registry.example/app:latest");
        assert_eq!(image.latest().repository, image.repository);
    }

    #[test]
    fn test_build_id_validation() {
        assert_eq!(BuildId::new("42").unwrap().as_str(), "42");
        assert!(BuildId::new("feature-1.2").is_ok());
        assert!(matches!(BuildId::new("latest"), Err(ShipError::InvalidBuildId(_))));
        assert!(BuildId::new("has space").is_err());
        assert!(BuildId::new("").is_err());
        assert!(BuildId::local().as_str().starts_with("local-"));
    }
}
