//! Archival of completed projects.
//!
//! The student's repository is cloned into a scratch directory, reduced to
//! source notebooks, scripts and the README, packed as `repo.tar.gz` and
//! uploaded to `projects/{semester}/{name}/repo.tar.gz`. The scratch
//! directory is a [`tempfile::TempDir`], so it is removed when the archive
//! call returns, whether it succeeded or not.

use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};

use crate::db::Proposal;
use crate::storage::{ObjectStore, StorageError};

const INCLUDED_EXTENSIONS: &[&str] = &["py", "ipynb"];
const INCLUDED_FILES: &[&str] = &["README.md"];
const ARCHIVE_FILE: &str = "repo.tar.gz";
pub const DEFAULT_CLONE_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("git clone of {url} failed: {stderr}")]
    Clone { url: String, stderr: String },
    #[error("git clone of {url} did not finish within {limit:?}")]
    CloneTimeout { url: String, limit: Duration },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),
    #[error("archive task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    pub name: String,
    pub repo_url: String,
    pub semester: String,
}

impl ArchiveRequest {
    pub fn from_proposal(proposal: &Proposal) -> Self {
        Self {
            name: proposal.content.name.clone(),
            repo_url: proposal.content.github_link.clone(),
            semester: proposal.content.semester.clone(),
        }
    }

    pub fn object_name(&self) -> String {
        format!(
            "projects/{}/{}/{}",
            path_segment(&self.semester),
            path_segment(&self.name),
            ARCHIVE_FILE
        )
    }
}

/// Makes a user supplied value safe to use as one object path segment.
fn path_segment(value: &str) -> String {
    let cleaned: String = value
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "unknown".to_string(),
        _ => cleaned,
    }
}

#[async_trait]
pub trait RepoCloner: Send + Sync {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ArchiveError>;
}

/// Shallow clone with the `git` binary on the PATH. The child is killed if
/// the clone future is dropped.
pub struct GitCloner;

#[async_trait]
impl RepoCloner for GitCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ArchiveError> {
        let output = Command::new("git")
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            return Err(ArchiveError::Clone {
                url: url.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn is_included(path: &Path) -> bool {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    if INCLUDED_FILES.contains(&file_name) {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| INCLUDED_EXTENSIONS.contains(&ext))
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir() {
            if entry.file_name() != ".git" {
                collect_files(root, &path, out)?;
            }
        } else if is_included(&path) {
            if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }
    Ok(())
}

/// Packs the matching files under `source` into a gzipped tarball with
/// paths relative to `source`.
pub fn compress_filtered(source: &Path) -> Result<Vec<u8>, ArchiveError> {
    let mut files = Vec::new();
    collect_files(source, source, &mut files)?;

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut tar = tar::Builder::new(encoder);
    for relative in &files {
        tar.append_path_with_name(source.join(relative), relative)?;
    }
    let bytes = tar.into_inner()?.finish()?;
    Ok(bytes)
}

pub struct Archiver {
    cloner: Arc<dyn RepoCloner>,
    store: Arc<dyn ObjectStore>,
    scratch_root: PathBuf,
    clone_timeout: Duration,
}

impl Archiver {
    pub fn new(cloner: Arc<dyn RepoCloner>, store: Arc<dyn ObjectStore>, scratch_root: PathBuf) -> Self {
        Self {
            cloner,
            store,
            scratch_root,
            clone_timeout: DEFAULT_CLONE_TIMEOUT,
        }
    }

    pub fn with_clone_timeout(mut self, limit: Duration) -> Self {
        self.clone_timeout = limit;
        self
    }

    /// Clones, filters, compresses and uploads one repository. Returns the
    /// locator of the uploaded archive.
    pub async fn archive(&self, request: &ArchiveRequest) -> Result<String, ArchiveError> {
        tokio::fs::create_dir_all(&self.scratch_root).await?;
        let scratch = tempfile::Builder::new()
            .prefix("archive-")
            .tempdir_in(&self.scratch_root)?;
        let checkout = scratch.path().join("repo");

        tokio::time::timeout(
            self.clone_timeout,
            self.cloner.clone_repo(&request.repo_url, &checkout),
        )
        .await
        .map_err(|_| ArchiveError::CloneTimeout {
            url: request.repo_url.clone(),
            limit: self.clone_timeout,
        })??;

        let source = checkout.clone();
        let bytes = tokio::task::spawn_blocking(move || compress_filtered(&source)).await??;

        let object_name = request.object_name();
        let locator = self.store.put(&object_name, bytes, "application/gzip").await?;
        info!(repo = %request.repo_url, "Archived project to {}", locator);
        Ok(locator)
    }

    /// Archives a completed proposal, logging instead of failing.
    pub async fn archive_completed(&self, proposal: &Proposal) -> Option<String> {
        let request = ArchiveRequest::from_proposal(proposal);
        match self.archive(&request).await {
            Ok(locator) => Some(locator),
            Err(e) => {
                warn!(proposal_id = %proposal.proposal_id, "Archival failed: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalObjectStore;
    use flate2::read::GzDecoder;

    /// Writes a fixed tree instead of running git.
    struct FixtureCloner;

    #[async_trait]
    impl RepoCloner for FixtureCloner {
        async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<(), ArchiveError> {
            std::fs::create_dir_all(dest.join("notebooks"))?;
            std::fs::create_dir_all(dest.join(".git"))?;
            std::fs::write(dest.join("README.md"), "# Retail")?;
            std::fs::write(dest.join("train.py"), "print('fit')")?;
            std::fs::write(dest.join("notebooks/eda.ipynb"), "{}")?;
            std::fs::write(dest.join("data.csv"), "a,b")?;
            std::fs::write(dest.join(".git/config.py"), "")?;
            Ok(())
        }
    }

    struct FailingCloner;

    #[async_trait]
    impl RepoCloner for FailingCloner {
        async fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ArchiveError> {
            std::fs::create_dir_all(dest)?;
            std::fs::write(dest.join("partial.py"), "")?;
            Err(ArchiveError::Clone {
                url: url.to_string(),
                stderr: "repository not found".to_string(),
            })
        }
    }

    /// Never finishes, like a clone stuck on a dead connection.
    struct StalledCloner;

    #[async_trait]
    impl RepoCloner for StalledCloner {
        async fn clone_repo(&self, _url: &str, dest: &Path) -> Result<(), ArchiveError> {
            std::fs::create_dir_all(dest)?;
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn request() -> ArchiveRequest {
        ArchiveRequest {
            name: "Ada".to_string(),
            repo_url: "https://github.com/example/retail".to_string(),
            semester: "Fall".to_string(),
        }
    }

    fn tar_entries(bytes: &[u8]) -> Vec<String> {
        let mut archive = tar::Archive::new(GzDecoder::new(bytes));
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn object_name_uses_semester_and_student() {
        assert_eq!(request().object_name(), "projects/Fall/Ada/repo.tar.gz");
        let odd = ArchiveRequest {
            name: "../Ada/Lee".to_string(),
            repo_url: String::new(),
            semester: " ".to_string(),
        };
        assert_eq!(odd.object_name(), "projects/unknown/.._Ada_Lee/repo.tar.gz");
    }

    #[tokio::test]
    async fn archive_uploads_filtered_tarball_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(
            Arc::new(FixtureCloner),
            Arc::new(LocalObjectStore::new(bucket.path())),
            scratch.path().to_path_buf(),
        );

        archiver.archive(&request()).await.unwrap();

        let uploaded = std::fs::read(bucket.path().join("projects/Fall/Ada/repo.tar.gz")).unwrap();
        assert_eq!(
            tar_entries(&uploaded),
            vec!["README.md", "notebooks/eda.ipynb", "train.py"]
        );
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_clone_leaves_no_scratch_files() {
        let scratch = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(
            Arc::new(FailingCloner),
            Arc::new(LocalObjectStore::new(bucket.path())),
            scratch.path().to_path_buf(),
        );

        let err = archiver.archive(&request()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::Clone { .. }));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(bucket.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stalled_clone_times_out_and_cleans_up() {
        let scratch = tempfile::tempdir().unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(
            Arc::new(StalledCloner),
            Arc::new(LocalObjectStore::new(bucket.path())),
            scratch.path().to_path_buf(),
        )
        .with_clone_timeout(Duration::from_millis(50));

        let err = archiver.archive(&request()).await.unwrap_err();
        assert!(matches!(err, ArchiveError::CloneTimeout { limit, .. } if limit == Duration::from_millis(50)));
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
        assert_eq!(std::fs::read_dir(bucket.path()).unwrap().count(), 0);
    }
}
