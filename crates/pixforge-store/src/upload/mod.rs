//! Upload backends
//!
//! Every backend turns a local image file into an externally reachable URL
//! that generation providers can fetch. The backend is chosen once at
//! startup and never per request.

mod cache;
mod git_cdn;
mod imgbb;

pub use cache::{normalize_local_path, CachedUpload, CachedUploader, CACHE_FILE_NAME};
pub use git_cdn::GitCdnUploader;
pub use imgbb::ImgBbUploader;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Timeout for upload HTTP calls
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors raised by upload backends
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Missing or invalid backend configuration
    #[error("upload misconfigured: {0}")]
    Config(String),

    /// Local file access failed
    #[error("upload io error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure talking to the host
    #[error("upload transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Host answered with a non-success status
    #[error("upload rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Host answered 200 with an unusable body
    #[error("malformed upload response: {0}")]
    MalformedResponse(String),

    /// A git step failed
    #[error("git {step} failed: {detail}")]
    Git { step: &'static str, detail: String },
}

impl UploadError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Turns a local file into an external URL
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &str;

    /// Upload `local_path`; `original_filename` is informational
    async fn upload(&self, local_path: &Path, original_filename: &str) -> Result<String, UploadError>;
}

/// Selectable backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadBackend {
    /// Image hosting API
    #[default]
    Imgbb,
    /// Commit into a git repository served through jsDelivr
    GithubJsdelivr,
}

impl FromStr for UploadBackend {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "imgbb" => Ok(Self::Imgbb),
            "github_jsdelivr" => Ok(Self::GithubJsdelivr),
            other => Err(UploadError::config(format!(
                "unsupported upload backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for UploadBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imgbb => write!(f, "imgbb"),
            Self::GithubJsdelivr => write!(f, "github_jsdelivr"),
        }
    }
}

/// Image host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImgBbConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_imgbb_endpoint")]
    pub endpoint: String,
}

/// Default image host endpoint
pub fn default_imgbb_endpoint() -> String {
    "https://api.imgbb.com/1/upload".to_string()
}

impl Default for ImgBbConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_imgbb_endpoint(),
        }
    }
}

/// Git repository CDN settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitCdnConfig {
    /// Repository owner
    #[serde(default)]
    pub username: Option<String>,

    /// Repository name
    #[serde(default)]
    pub repo: Option<String>,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Local working copy
    #[serde(default)]
    pub local_repo_path: Option<PathBuf>,
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for GitCdnConfig {
    fn default() -> Self {
        Self {
            username: None,
            repo: None,
            branch: default_branch(),
            local_repo_path: None,
        }
    }
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Raw backend name; parsed by [`build_uploader`]
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub imgbb: ImgBbConfig,

    #[serde(default)]
    pub github: GitCdnConfig,
}

fn default_backend() -> String {
    UploadBackend::default().to_string()
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            imgbb: ImgBbConfig::default(),
            github: GitCdnConfig::default(),
        }
    }
}

/// Build the configured uploader.
///
/// An unknown backend name does not abort startup; the returned uploader
/// fails every call with a configuration error instead.
pub fn build_uploader(config: &UploadConfig) -> Arc<dyn Uploader> {
    match config.backend.parse::<UploadBackend>() {
        Ok(UploadBackend::Imgbb) => Arc::new(ImgBbUploader::new(config.imgbb.clone())),
        Ok(UploadBackend::GithubJsdelivr) => Arc::new(GitCdnUploader::new(config.github.clone())),
        Err(e) => {
            warn!("{}; uploads will fail until this is fixed", e);
            Arc::new(MisconfiguredUploader {
                reason: e.to_string(),
            })
        }
    }
}

/// Uploader standing in for an unusable configuration
#[derive(Debug, Clone)]
pub struct MisconfiguredUploader {
    reason: String,
}

#[async_trait]
impl Uploader for MisconfiguredUploader {
    fn backend(&self) -> &str {
        "misconfigured"
    }

    async fn upload(&self, _local_path: &Path, _original_filename: &str) -> Result<String, UploadError> {
        Err(UploadError::Config(self.reason.clone()))
    }
}
