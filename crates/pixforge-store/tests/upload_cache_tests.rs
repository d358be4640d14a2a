//! Upload cache behaviour against a counting mock backend

use async_trait::async_trait;
use pixforge_store::{CachedUploader, UploadError, Uploader};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Backend that counts calls and returns a URL derived from the call number
struct CountingUploader {
    calls: AtomicU32,
    latency: Duration,
    fail: bool,
}

impl CountingUploader {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            latency: Duration::ZERO,
            fail: false,
        }
    }

    fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Uploader for CountingUploader {
    fn backend(&self) -> &str {
        "counting"
    }

    async fn upload(&self, local_path: &Path, _original_filename: &str) -> Result<String, UploadError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(UploadError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        assert!(local_path.is_file(), "upload called with missing file");
        Ok(format!("http://cdn/upload-{}.jpg", n))
    }
}

struct Fixture {
    _tmp: TempDir,
    history_dir: std::path::PathBuf,
    cache_file: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let history_dir = tmp.path().join("history");
    std::fs::create_dir_all(history_dir.join("inputs")).unwrap();
    std::fs::write(history_dir.join("inputs").join("a.jpg"), b"jpeg").unwrap();
    let cache_file = history_dir.join(pixforge_store::CACHE_FILE_NAME);
    Fixture {
        _tmp: tmp,
        history_dir,
        cache_file,
    }
}

#[tokio::test]
async fn test_cache_hit_skips_network() {
    let fx = fixture();
    std::fs::write(
        &fx.cache_file,
        r#"{"history/inputs/a.jpg": "http://cdn/a.jpg"}"#,
    )
    .unwrap();

    let backend = Arc::new(CountingUploader::new());
    let cached = CachedUploader::new(backend.clone(), &fx.cache_file, &fx.history_dir);

    let (normalized, _) = cached.resolve("/history/inputs/a.jpg").unwrap();
    let result = cached.upload(&normalized).await.unwrap();

    assert_eq!(result.url, "http://cdn/a.jpg");
    assert!(result.cached);
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_miss_uploads_and_persists() {
    let fx = fixture();
    let backend = Arc::new(CountingUploader::new());
    let cached = CachedUploader::new(backend.clone(), &fx.cache_file, &fx.history_dir);

    let first = cached.upload("history/inputs/a.jpg").await.unwrap();
    assert!(!first.cached);
    assert_eq!(first.url, "http://cdn/upload-1.jpg");

    let second = cached.upload("history/inputs/a.jpg").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.url, first.url);
    assert_eq!(backend.calls(), 1);

    let on_disk: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&fx.cache_file).unwrap()).unwrap();
    assert_eq!(on_disk["history/inputs/a.jpg"], "http://cdn/upload-1.jpg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_uploads_of_same_path_upload_once() {
    let fx = fixture();
    let backend = Arc::new(CountingUploader::new().with_latency(Duration::from_millis(50)));
    let cached = Arc::new(CachedUploader::new(
        backend.clone(),
        &fx.cache_file,
        &fx.history_dir,
    ));

    let a = {
        let cached = cached.clone();
        tokio::spawn(async move { cached.upload("history/inputs/a.jpg").await })
    };
    let b = {
        let cached = cached.clone();
        tokio::spawn(async move { cached.upload("history/inputs/a.jpg").await })
    };

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();

    assert_eq!(a.url, b.url);
    assert_eq!(backend.calls(), 1);
    assert!(a.cached != b.cached);
}

#[tokio::test]
async fn test_failed_upload_not_cached() {
    let fx = fixture();
    let backend = Arc::new(CountingUploader::new().failing());
    let cached = CachedUploader::new(backend.clone(), &fx.cache_file, &fx.history_dir);

    let err = cached.upload("history/inputs/a.jpg").await.unwrap_err();
    assert!(matches!(err, UploadError::Rejected { status: 503, .. }));
    assert!(!fx.cache_file.exists());
}

#[tokio::test]
async fn test_corrupt_cache_treated_as_empty() {
    let fx = fixture();
    std::fs::write(&fx.cache_file, "{oops").unwrap();

    let backend = Arc::new(CountingUploader::new());
    let cached = CachedUploader::new(backend.clone(), &fx.cache_file, &fx.history_dir);

    let result = cached.upload("history/inputs/a.jpg").await.unwrap();
    assert!(!result.cached);
    assert_eq!(backend.calls(), 1);
}

#[test]
fn test_resolve_errors() {
    let fx = fixture();
    let cached = CachedUploader::new(
        Arc::new(CountingUploader::new()),
        &fx.cache_file,
        &fx.history_dir,
    );

    assert!(matches!(
        cached.resolve("../secret"),
        Err(pixforge_core::Error::InvalidInput(_))
    ));
    assert!(matches!(
        cached.resolve("/static/app.js"),
        Err(pixforge_core::Error::InvalidInput(_))
    ));
    assert!(cached
        .resolve("/history/inputs/missing.jpg")
        .unwrap_err()
        .is_not_found());
}
