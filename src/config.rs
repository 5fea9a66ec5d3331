use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Where completed projects are archived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveTarget {
    Disabled,
    Local(PathBuf),
    Gcs { bucket: String, access_token: String },
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub storage_backend: StorageBackend,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    /// argon2 PHC string; reviewer login is disabled without it.
    pub reviewer_password_hash: Option<String>,
    pub token_ttl_secs: u64,
    pub archive: ArchiveTarget,
    pub scratch_folder: PathBuf,
    pub clone_timeout_secs: u64,
    pub verify_github_links: bool,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match var(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let storage_backend = match var("STORAGE_BACKEND") {
            None => StorageBackend::Postgres,
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "STORAGE_BACKEND",
                value,
            })?,
        };

        let database_url = match (storage_backend, var("DATABASE_URL")) {
            (_, Some(url)) => url,
            (StorageBackend::Postgres, None) => return Err(ConfigError::Missing("DATABASE_URL")),
            (StorageBackend::Memory, None) => String::new(),
        };

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let archive = match (var("ARCHIVE_BUCKET"), var("ARCHIVE_FOLDER")) {
            (Some(bucket), _) => ArchiveTarget::Gcs {
                bucket,
                access_token: var("GCS_ACCESS_TOKEN").ok_or(ConfigError::Missing("GCS_ACCESS_TOKEN"))?,
            },
            (None, Some(folder)) => ArchiveTarget::Local(base_dir.join(folder)),
            (None, None) => ArchiveTarget::Disabled,
        };
        let scratch_folder = base_dir.join(var("SCRATCH_FOLDER").unwrap_or_else(|| "scratch".to_string()));

        Ok(Self {
            database_url,
            storage_backend,
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 8000)?,
            jwt_secret,
            reviewer_password_hash: var("REVIEWER_PASSWORD_HASH"),
            token_ttl_secs: parsed("TOKEN_TTL_SECS", 8 * 60 * 60)?,
            archive,
            scratch_folder,
            clone_timeout_secs: parsed("CLONE_TIMEOUT_SECS", 120)?,
            verify_github_links: parsed("VERIFY_GITHUB_LINKS", false)?,
        })
    }

    /// In-memory configuration for tests and local demos.
    pub fn for_memory(jwt_secret: &str, reviewer_password_hash: Option<String>) -> Self {
        Self {
            database_url: String::new(),
            storage_backend: StorageBackend::Memory,
            host: "127.0.0.1".to_string(),
            port: 0,
            jwt_secret: jwt_secret.to_string(),
            reviewer_password_hash,
            token_ttl_secs: 600,
            archive: ArchiveTarget::Disabled,
            scratch_folder: std::env::temp_dir(),
            clone_timeout_secs: 120,
            verify_github_links: false,
        }
    }
}
