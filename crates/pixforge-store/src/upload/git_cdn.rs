//! Repository CDN backend (GitHub + jsDelivr)
//!
//! Copies the image into a local working copy, commits, pushes, and derives
//! the CDN URL from the repository identity. A failed push leaves the copied
//! file behind; nothing is rolled back.

use super::{GitCdnConfig, UploadError, Uploader};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Subdirectory of the repository holding uploaded images
const REMOTE_SUBDIR: &str = "images";

/// Commits uploads into a git repository served through jsDelivr
#[derive(Debug)]
pub struct GitCdnUploader {
    config: GitCdnConfig,
    git_lock: Mutex<()>,
}

impl GitCdnUploader {
    pub fn new(config: GitCdnConfig) -> Self {
        Self {
            config,
            git_lock: Mutex::new(()),
        }
    }

    fn settings(&self) -> Result<(&str, &str, PathBuf), UploadError> {
        let username = non_empty(self.config.username.as_deref());
        let repo = non_empty(self.config.repo.as_deref());
        let repo_path = self
            .config
            .local_repo_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());

        let (Some(username), Some(repo), Some(repo_path)) = (username, repo, repo_path) else {
            return Err(UploadError::config(
                "GITHUB_USERNAME, GITHUB_REPO and LOCAL_REPO_PATH must all be set",
            ));
        };

        if !repo_path.is_dir() {
            return Err(UploadError::config(format!(
                "LOCAL_REPO_PATH not found: {}",
                repo_path.display()
            )));
        }

        Ok((username, repo, repo_path.clone()))
    }

    /// Public URL for a file at `relative_path` inside the repository
    pub fn cdn_url(&self, username: &str, repo: &str, relative_path: &str) -> String {
        format!(
            "https://cdn.jsdelivr.net/gh/{}/{}@{}/{}",
            username,
            repo,
            self.config.branch,
            relative_path.replace('\\', "/")
        )
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

async fn run_git(repo_path: &Path, step: &'static str, args: &[&str]) -> Result<(), UploadError> {
    debug!("git {}", args.join(" "));

    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .await
        .map_err(|e| UploadError::Git {
            step,
            detail: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let detail = if stderr.is_empty() {
            format!("exit status {}", output.status)
        } else {
            stderr
        };
        Err(UploadError::Git { step, detail })
    }
}

#[async_trait]
impl Uploader for GitCdnUploader {
    fn backend(&self) -> &str {
        "github_jsdelivr"
    }

    async fn upload(&self, local_path: &Path, original_filename: &str) -> Result<String, UploadError> {
        let (username, repo, repo_path) = self.settings()?;

        let unique_name = format!("{}.jpg", uuid::Uuid::new_v4().simple());
        let relative_path = format!("{}/{}", REMOTE_SUBDIR, unique_name);
        let target = repo_path.join(REMOTE_SUBDIR).join(&unique_name);

        tokio::fs::create_dir_all(repo_path.join(REMOTE_SUBDIR)).await?;
        tokio::fs::copy(local_path, &target).await?;

        let _guard = self.git_lock.lock().await;
        let message = format!("Add image via uploader: {}", unique_name);
        run_git(&repo_path, "add", &["add", &relative_path]).await?;
        run_git(&repo_path, "commit", &["commit", "-m", &message]).await?;
        run_git(&repo_path, "push", &["push", "origin", &self.config.branch]).await?;

        let url = self.cdn_url(username, repo, &relative_path);
        info!("Pushed {} as {}", original_filename, relative_path);
        Ok(url)
    }
}
