use std::sync::Arc;

use capstone::config::{ArchiveTarget, Config, StorageBackend};
use capstone::db::{self, MemoryStore, PgStore, ProposalStore};
use capstone::{routes, state, storage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capstone=info,tower_http=info".into()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    if let ArchiveTarget::Local(dir) = &config.archive {
        storage::ensure_dirs(&[dir.as_path(), config.scratch_folder.as_path()])?;
    }

    let store: Arc<dyn ProposalStore> = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = db::create_pool(&config.database_url).await?;
            db::run_migrations(pool.as_ref()).await?;
            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; proposals are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if config.reviewer_password_hash.is_none() {
        tracing::warn!("REVIEWER_PASSWORD_HASH is not set; reviewer actions are unavailable");
    }

    let state = Arc::new(state::AppState::new(config.clone(), store)?);
    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Capstone proposals listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
