use std::sync::Arc;
use std::time::Duration;

use crate::archive::{Archiver, GitCloner};
use crate::auth::TokenIssuer;
use crate::config::{ArchiveTarget, Config};
use crate::db::ProposalStore;
use crate::github::GithubClient;
use crate::lifecycle::LifecycleEngine;
use crate::storage::{GcsObjectStore, LocalObjectStore, ObjectStore};

pub struct AppState {
    pub engine: LifecycleEngine,
    pub config: Arc<Config>,
    pub tokens: TokenIssuer,
    pub archiver: Option<Archiver>,
    pub github: Option<GithubClient>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn ProposalStore>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let object_store: Option<Arc<dyn ObjectStore>> = match &config.archive {
            ArchiveTarget::Disabled => None,
            ArchiveTarget::Local(dir) => Some(Arc::new(LocalObjectStore::new(dir.clone()))),
            ArchiveTarget::Gcs {
                bucket,
                access_token,
            } => Some(Arc::new(GcsObjectStore::new(
                bucket.clone(),
                access_token.clone(),
            )?)),
        };
        let archiver = object_store.map(|store| {
            Archiver::new(Arc::new(GitCloner), store, config.scratch_folder.clone())
                .with_clone_timeout(Duration::from_secs(config.clone_timeout_secs))
        });

        let github = if config.verify_github_links {
            Some(GithubClient::new()?)
        } else {
            None
        };

        Ok(Self {
            engine: LifecycleEngine::new(store),
            tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl_secs),
            config,
            archiver,
            github,
        })
    }
}
