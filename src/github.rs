use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{info, warn};

use crate::forms::parse_github_link;

const GITHUB_API: &str = "https://api.github.com";

#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    #[error("{0:?} is not a https://github.com/owner/repo link")]
    NotARepoLink(String),
    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("GitHub answered with status {0}")]
    Unexpected(StatusCode),
}

/// Checks that submitted repository links point at an existing public repo.
pub struct GithubClient {
    client: Client,
    api_base: String,
}

impl GithubClient {
    pub fn new() -> Result<Self, GithubError> {
        Self::with_base(GITHUB_API)
    }

    pub fn with_base(api_base: &str) -> Result<Self, GithubError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("capstone/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub async fn repo_exists(&self, link: &str) -> Result<bool, GithubError> {
        let (owner, repo) =
            parse_github_link(link).ok_or_else(|| GithubError::NotARepoLink(link.to_string()))?;

        let url = format!("{}/repos/{}/{}", self.api_base, owner, repo);
        let status = self.client.get(&url).send().await?.status();

        match status {
            s if s.is_success() => {
                info!("Verified GitHub repository {}/{}", owner, repo);
                Ok(true)
            }
            StatusCode::NOT_FOUND => Ok(false),
            other => {
                warn!("GitHub lookup for {}/{} returned {}", owner, repo, other);
                Err(GithubError::Unexpected(other))
            }
        }
    }
}
