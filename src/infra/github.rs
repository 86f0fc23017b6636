//! GitHub HTTP client
//!
//! Only the repository-creation call used by the bootstrapper.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::Secret;
use crate::error::{ShipError, ShipResult};

/// Repository descriptor loaded from a static JSON file and sent verbatim
#[derive(Clone, Debug)]
pub struct RepoDescriptor {
    pub name: String,
    pub body: serde_json::Value,
}

impl RepoDescriptor {
    pub fn parse(text: &str) -> ShipResult<Self> {
        let body: serde_json::Value = serde_json::from_str(text)?;
        let name = body
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ShipError::Config("repository descriptor needs a non-empty \"name\"".to_string()))?
            .to_string();
        Ok(Self { name, body })
    }

    pub async fn load(path: &Path) -> ShipResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ShipError::MissingSource(path.to_path_buf()),
                _ => ShipError::Io(e),
            })?;
        Self::parse(&text)
    }
}

/// Subset of the repository object returned by GitHub
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CreatedRepository {
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    pub ssh_url: String,
}

/// Remote source-hosting service
#[async_trait]
pub trait RepositoryHost: Send + Sync {
    async fn create_repository(&self, descriptor: &RepoDescriptor) -> ShipResult<CreatedRepository>;
}

/// GitHub REST v3 client authenticated with user + token
#[derive(Clone)]
pub struct GithubClient {
    client: Client,
    api_base: String,
    user: String,
    token: Secret,
}

impl GithubClient {
    pub fn new(api_base: &str, user: &str, token: Secret) -> ShipResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("aks-shipper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            user: user.to_string(),
            token,
        })
    }

    fn repos_url(&self) -> String {
        format!("{}/user/repos", self.api_base)
    }
}

#[async_trait]
impl RepositoryHost for GithubClient {
    async fn create_repository(&self, descriptor: &RepoDescriptor) -> ShipResult<CreatedRepository> {
        let url = self.repos_url();
        info!(repo = %descriptor.name, url = %url, "Creating remote repository");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(self.token.expose()))
            .header("Accept", "application/vnd.github+json")
            .json(&descriptor.body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShipError::RepoHost {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedRepository = response.json().await?;
        info!(repo = %created.full_name, url = %created.html_url, "Remote repository created");
        Ok(created)
    }
}
