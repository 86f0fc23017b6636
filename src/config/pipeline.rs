//! Build, test and publish configuration

use std::path::PathBuf;

use crate::config::env::{
    constants, load_with_fallback, parse_var, process_env, require_with_fallback, var, Lookup,
    Secret,
};
use crate::domain::image::{registry_host, BuildId, ImageRef};
use crate::error::{ShipError, ShipResult};

/// Registry the image is published to
#[derive(Clone, Debug)]
pub struct RegistryConfig {
    /// `<registry>/<name>` without tag
    pub repository: String,
    /// Host passed to `docker login`
    pub registry: String,
    /// Credentials; `None` skips `docker login`
    pub credentials: Option<RegistryCredentials>,
}

/// `docker login` credentials, both halves or neither
#[derive(Clone, Debug)]
pub struct RegistryCredentials {
    /// Registry user, or the service principal id for ACR
    pub username: String,
    /// Piped to `docker login --password-stdin`, never on argv
    pub password: Secret,
}

impl RegistryConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let repository = require_with_fallback(lookup, "IMAGE_REPOSITORY", "IMAGE_NAME")?;
        // Validates the repository grammar up front
        ImageRef::new(&repository, "latest")?;

        let registry = var(lookup, "REGISTRY_URL")
            .map(|url| {
                url.trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string()
            })
            .unwrap_or_else(|| registry_host(&repository).to_string());

        let credentials = match (var(lookup, "REGISTRY_USERNAME"), var(lookup, "REGISTRY_PASSWORD")) {
            (Some(username), Some(password)) => Some(RegistryCredentials {
                username,
                password: Secret::new(password),
            }),
            (None, None) => None,
            _ => {
                return Err(ShipError::Config(
                    "REGISTRY_USERNAME and REGISTRY_PASSWORD must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            repository,
            registry,
            credentials,
        })
    }

    /// `<repository>:<build-id>`
    pub fn image_for(&self, build_id: &BuildId) -> ShipResult<ImageRef> {
        ImageRef::new(&self.repository, build_id.as_str())
    }
}

/// Image build inputs
#[derive(Clone, Debug)]
pub struct BuildConfig {
    /// Directory sent to the docker daemon as build context
    pub context_dir: PathBuf,
    /// Dockerfile path, relative to the working directory
    pub dockerfile: PathBuf,
    /// Passed as the `BASE_IMAGE` build arg
    pub base_image: String,
    /// Tag of the versioned image
    pub build_id: BuildId,
    /// Command run inside the freshly built image before publishing,
    /// parsed with [`split_command`]
    pub test_command: Option<Vec<String>>,
}

impl BuildConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let build_id = match load_with_fallback(lookup, "BUILD_ID", "BUILD_NUMBER") {
            Some(id) => BuildId::new(id)?,
            None => BuildId::local(),
        };

        let test_command = match var(lookup, "TEST_COMMAND") {
            Some(cmd) => Some(split_command(&cmd)?).filter(|argv| !argv.is_empty()),
            None => None,
        };

        Ok(Self {
            context_dir: var(lookup, "BUILD_CONTEXT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            dockerfile: var(lookup, "DOCKERFILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("Dockerfile")),
            base_image: var(lookup, "BASE_IMAGE")
                .unwrap_or_else(|| constants::DEFAULT_BASE_IMAGE.to_string()),
            build_id,
            test_command,
        })
    }
}

/// Split a command line into argv the way a POSIX shell would quote it.
///
/// Single quotes are literal, double quotes honour `\"` and `\\`, and a bare
/// backslash escapes the next character. No expansion of any kind happens.
pub fn split_command(line: &str) -> ShipResult<Vec<String>> {
    #[derive(PartialEq)]
    enum Quote {
        None,
        Single,
        Double,
    }

    let mut argv = Vec::new();
    let mut current = String::new();
    // Distinguishes `""` (an empty argument) from no argument at all
    let mut in_word = false;
    let mut quote = Quote::None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Quote::Single => match c {
                '\'' => quote = Quote::None,
                _ => current.push(c),
            },
            Quote::Double => match c {
                '"' => quote = Quote::None,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => break,
                },
                _ => current.push(c),
            },
            Quote::None => match c {
                '\'' => {
                    quote = Quote::Single;
                    in_word = true;
                }
                '"' => {
                    quote = Quote::Double;
                    in_word = true;
                }
                '\\' => {
                    current.push(chars.next().unwrap_or('\\'));
                    in_word = true;
                }
                c if c.is_whitespace() => {
                    if in_word {
                        argv.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }

    if quote != Quote::None {
        return Err(ShipError::Config(format!(
            "TEST_COMMAND has an unterminated quote: {}",
            line
        )));
    }
    if in_word {
        argv.push(current);
    }
    Ok(argv)
}

/// Inputs of the rendered two-stage Dockerfile
#[derive(Clone, Debug)]
pub struct DockerfileConfig {
    pub base_image: String,
    /// Python package served by uvicorn as `<module>:app`
    pub app_module: String,
    pub port: u16,
    pub requirements_file: String,
}

impl DockerfileConfig {
    pub fn from_env() -> ShipResult<Self> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: Lookup<'_>) -> ShipResult<Self> {
        let app_module = var(lookup, "APP_MODULE")
            .unwrap_or_else(|| constants::DEFAULT_APP_MODULE.to_string());
        if !app_module
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(ShipError::Config(format!(
                "APP_MODULE must be a python module path, got `{}`",
                app_module
            )));
        }

        Ok(Self {
            base_image: var(lookup, "BASE_IMAGE")
                .unwrap_or_else(|| constants::DEFAULT_BASE_IMAGE.to_string()),
            app_module,
            port: parse_var(lookup, "APP_PORT")?.unwrap_or(constants::DEFAULT_APP_PORT),
            requirements_file: var(lookup, "REQUIREMENTS_FILE")
                .unwrap_or_else(|| "requirements.txt".to_string()),
        })
    }
}
