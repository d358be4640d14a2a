//! Read-through upload URL cache
//!
//! Maps a normalised relative path to the external URL it was uploaded to,
//! persisted as one flat JSON object. A single async mutex covers the whole
//! check, upload and write sequence so one local file never gets two URLs.

use super::{UploadError, Uploader};
use crate::history::resolve_web_path;
use pixforge_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Cache file name inside the history directory
pub const CACHE_FILE_NAME: &str = "upload.cache";

/// Outcome of a cached upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedUpload {
    pub url: String,
    /// Normalised relative path used as the cache key
    pub local_path: String,
    /// True when served from the cache without a network call
    pub cached: bool,
}

/// Uploader wrapper with a persistent path to URL cache
pub struct CachedUploader {
    inner: Arc<dyn Uploader>,
    cache_file: PathBuf,
    history_dir: PathBuf,
    lock: Mutex<()>,
}

impl CachedUploader {
    /// Paths are `history/...` web paths resolved inside `history_dir`
    pub fn new(
        inner: Arc<dyn Uploader>,
        cache_file: impl Into<PathBuf>,
        history_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            inner,
            cache_file: cache_file.into(),
            history_dir: history_dir.into(),
            lock: Mutex::new(()),
        }
    }

    /// Normalise a caller path and check that the file exists
    pub fn resolve(&self, raw_path: &str) -> Result<(String, PathBuf)> {
        let normalized = normalize_local_path(raw_path)?;
        let full_path = resolve_web_path(&self.history_dir, &normalized).ok_or_else(|| {
            Error::invalid_input(format!("path outside the history directory: {}", normalized))
        })?;
        if !full_path.is_file() {
            return Err(Error::not_found(format!("file not found: {}", normalized)));
        }
        Ok((normalized, full_path))
    }

    /// Upload a normalised path, reusing a cached URL when present
    pub async fn upload(&self, normalized: &str) -> std::result::Result<CachedUpload, UploadError> {
        let _guard = self.lock.lock().await;

        let mut cache = self.load_cache();
        if let Some(url) = cache.get(normalized) {
            debug!("Upload cache hit: {}", normalized);
            metrics::counter!("pixforge_uploads_total", "outcome" => "cached").increment(1);
            return Ok(CachedUpload {
                url: url.clone(),
                local_path: normalized.to_string(),
                cached: true,
            });
        }

        let full_path = resolve_web_path(&self.history_dir, normalized).ok_or_else(|| {
            UploadError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("path outside the history directory: {}", normalized),
            ))
        })?;
        let file_name = Path::new(normalized)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(normalized)
            .to_string();

        let url = match self.inner.upload(&full_path, &file_name).await {
            Ok(url) => url,
            Err(e) => {
                metrics::counter!("pixforge_uploads_total", "outcome" => "failed").increment(1);
                return Err(e);
            }
        };
        metrics::counter!("pixforge_uploads_total", "outcome" => "uploaded").increment(1);

        cache.insert(normalized.to_string(), url.clone());
        self.save_cache(&cache);
        info!("Uploaded {} via {}", normalized, self.inner.backend());

        Ok(CachedUpload {
            url,
            local_path: normalized.to_string(),
            cached: false,
        })
    }

    fn load_cache(&self) -> BTreeMap<String, String> {
        let content = match std::fs::read_to_string(&self.cache_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Upload cache unreadable, treating as empty: {}", e);
                return BTreeMap::new();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Upload cache corrupt, treating as empty: {}", e);
            BTreeMap::new()
        })
    }

    fn save_cache(&self, cache: &BTreeMap<String, String>) {
        let result = serde_json::to_string_pretty(cache)
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(&self.cache_file, json).map_err(|e| e.to_string()));

        if let Err(e) = result {
            warn!("Failed to write upload cache {}: {}", self.cache_file.display(), e);
        }
    }
}

/// Normalise a caller-supplied relative path.
///
/// Leading slashes are stripped, backslashes become forward slashes and
/// `.` segments are dropped. Parent segments and absolute or drive paths
/// are rejected.
pub fn normalize_local_path(raw: &str) -> Result<String> {
    let unified = raw.trim().replace('\\', "/");
    let bytes = unified.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return Err(Error::invalid_input(format!("absolute path not allowed: {}", raw)));
    }

    let mut segments = Vec::new();
    for segment in unified.trim_start_matches('/').split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(Error::invalid_input(format!(
                    "parent segments not allowed: {}",
                    raw
                )))
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(Error::invalid_input("empty path"));
    }
    Ok(segments.join("/"))
}
