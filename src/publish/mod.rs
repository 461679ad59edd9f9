//! Artifact publishing.
//!
//! An [`ArtifactHost`] is a version-controlled, path-addressed store that can
//! also serve a branch as a static site. [`GitHubHost`] is the production
//! implementation. The free functions here compose host calls into the
//! publish steps a round performs; none of them roll back on failure.

mod github;

pub use github::GitHubHost;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::task::FileSet;

/// Branch every artifact is published from.
pub const BRANCH: &str = "main";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to {action}: HTTP {status}: {body}")]
    Status {
        action: String,
        status: u16,
        body: String,
    },

    #[error("Failed to {action}: {source}")]
    Transport {
        action: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response while trying to {action}: {reason}")]
    InvalidResponse { action: String, reason: String },
}

/// Result of asking the host to serve a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagesStatus {
    Enabled,
    AlreadyEnabled,
}

/// How a round obtains its publish location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    /// Create the location; any non-created response fails.
    Create,
    /// Create the location only if a lookup says it is missing.
    EnsureExists,
}

/// A published artifact.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub name: String,
    pub repo_url: String,
    pub pages_url: String,
    pub commit_sha: String,
}

/// A path-addressed store that can serve a branch as a static site.
#[async_trait]
pub trait ArtifactHost: Send + Sync {
    /// Create a public, auto-initialized repository with an MIT license.
    async fn create_repository(&self, name: &str) -> Result<(), PublishError>;

    async fn repository_exists(&self, name: &str) -> Result<bool, PublishError>;

    /// Current blob identifier of `path` on `branch`, if the file exists.
    async fn file_sha(
        &self,
        repo: &str,
        path: &str,
        branch: &str,
    ) -> Result<Option<String>, PublishError>;

    /// Write a file. `sha` marks the write as an update of an existing file.
    async fn put_file(
        &self,
        repo: &str,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
    ) -> Result<(), PublishError>;

    async fn enable_pages(&self, repo: &str, branch: &str) -> Result<PagesStatus, PublishError>;

    async fn latest_commit(&self, repo: &str, branch: &str) -> Result<String, PublishError>;

    fn repo_url(&self, repo: &str) -> String;

    fn pages_url(&self, repo: &str) -> String;
}

/// Obtain a publish location for `name`.
pub async fn provision(
    host: &dyn ArtifactHost,
    name: &str,
    mode: Provisioning,
) -> Result<(), PublishError> {
    match mode {
        Provisioning::Create => host.create_repository(name).await,
        Provisioning::EnsureExists => {
            if host.repository_exists(name).await? {
                tracing::info!(repo = %name, "Publish location already exists");
                Ok(())
            } else {
                host.create_repository(name).await
            }
        }
    }
}

/// Upload every file in order, updating files that already exist on [`BRANCH`].
///
/// Files written before a failure stay written.
pub async fn upload_files(
    host: &dyn ArtifactHost,
    repo: &str,
    files: &FileSet,
) -> Result<usize, PublishError> {
    let mut written = 0;
    for (path, content) in files.iter() {
        let sha = host.file_sha(repo, path, BRANCH).await?;
        host.put_file(repo, path, content.as_bytes(), sha.as_deref())
            .await?;
        tracing::debug!(repo = %repo, path = %path, update = sha.is_some(), "Uploaded file");
        written += 1;
    }
    Ok(written)
}
