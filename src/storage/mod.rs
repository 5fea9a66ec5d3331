use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid object name {0:?}")]
    InvalidName(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for archived project files.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `name` and returns a locator for the stored object.
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;
}

/// Object names are `/` separated relative paths with no empty, `.` or `..` segments.
fn check_name(name: &str) -> Result<(), StorageError> {
    let clean = name
        .split('/')
        .all(|segment| !segment.is_empty() && segment != "." && segment != ".." && !segment.contains('\\'));
    if clean {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Writes objects below a root directory on the local filesystem.
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        check_name(name)?;
        let target = self.root.join(name);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;
        Ok(target.display().to_string())
    }
}

/// Google Cloud Storage bucket through the JSON media upload endpoint.
pub struct GcsObjectStore {
    client: reqwest::Client,
    bucket: String,
    access_token: String,
}

impl GcsObjectStore {
    pub fn new(bucket: String, access_token: String) -> Result<Self, StorageError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            bucket,
            access_token,
        })
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        check_name(name)?;
        let url = format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o",
            self.bucket
        );

        let response = self
            .client
            .post(&url)
            .query(&[("uploadType", "media"), ("name", name)])
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Rejected { status, body });
        }

        Ok(format!("gs://{}/{}", self.bucket, name))
    }
}

pub fn ensure_dirs(dirs: &[&Path]) -> std::io::Result<()> {
    for dir in dirs {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_writes_nested_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let locator = store
            .put("projects/Fall/Ada/repo.tar.gz", b"data".to_vec(), "application/gzip")
            .await
            .unwrap();
        let written = dir.path().join("projects/Fall/Ada/repo.tar.gz");
        assert_eq!(locator, written.display().to_string());
        assert_eq!(std::fs::read(written).unwrap(), b"data");
    }

    #[tokio::test]
    async fn local_store_refuses_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        for name in ["../outside", "/etc/passwd", "", "a/./b"] {
            let result = store.put(name, vec![1], "application/octet-stream").await;
            assert!(matches!(result, Err(StorageError::InvalidName(_))), "{name}");
        }
    }
}
