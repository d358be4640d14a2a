//! Flat-file history store
//!
//! One pretty-printed JSON file per record at `<dir>/<id>.json`, input
//! copies under `<dir>/inputs/` and downloaded results under `<dir>/results/`.
//! Image paths inside records are web paths of the form `/history/...`.

use crate::upload::normalize_local_path;
use parking_lot::RwLock;
use pixforge_core::{Error, HistoryRecord, Result};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// URL segment the history directory is served under
pub const WEB_PREFIX: &str = "history";

/// Default page size for listings
pub const DEFAULT_PAGE_LIMIT: usize = 12;

/// Map a web path (`/history/results/a.jpg`) onto a file inside `history_dir`.
///
/// Returns `None` for paths outside the history mount or with parent
/// segments.
pub fn resolve_web_path(history_dir: &Path, web_path: &str) -> Option<PathBuf> {
    let normalized = normalize_local_path(web_path).ok()?;
    let rest = normalized.strip_prefix(WEB_PREFIX)?.strip_prefix('/')?;
    Some(history_dir.join(rest))
}

/// One record as shown in listings
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub id: String,
    pub timestamp: String,
    pub result_paths: Vec<String>,
    pub result_urls: Vec<String>,
    pub input_paths: Vec<String>,
    pub input_urls: Vec<String>,
    pub params: HistoryParams,
}

/// Generation parameters of a listed record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryParams {
    pub size: String,
    pub aspect_ratio: String,
    pub prompt: String,
}

impl From<HistoryRecord> for HistoryEntry {
    fn from(record: HistoryRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp,
            result_paths: record.result_local_paths,
            result_urls: record.result_urls,
            input_paths: record.input_local_paths,
            input_urls: record.input_urls,
            params: HistoryParams {
                size: record.size,
                aspect_ratio: record.aspect_ratio,
                prompt: record.prompt,
            },
        }
    }
}

/// One page of history
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub records: Vec<HistoryEntry>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub pages: usize,
}

/// History directory owner.
///
/// A directory-level lock keeps listings from observing a half-finished
/// delete: `list` reads under a shared guard, `save` and `delete` take it
/// exclusively.
#[derive(Debug)]
pub struct HistoryStore {
    dir: PathBuf,
    lock: RwLock<()>,
}

impl HistoryStore {
    /// Open (and create) the history directory layout
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = absolutize(&dir.into())?;
        std::fs::create_dir_all(dir.join("inputs"))?;
        std::fs::create_dir_all(dir.join("results"))?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory for local copies of uploaded inputs
    pub fn inputs_dir(&self) -> PathBuf {
        self.dir.join("inputs")
    }

    /// Directory for downloaded and cropped results
    pub fn results_dir(&self) -> PathBuf {
        self.dir.join("results")
    }

    /// Web path for a file inside the history directory
    pub fn web_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.dir).unwrap_or(path);
        let joined = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        format!("/{}/{}", WEB_PREFIX, joined)
    }

    /// File for a web path, if it lies inside the history directory
    pub fn resolve_web_path(&self, web_path: &str) -> Option<PathBuf> {
        resolve_web_path(&self.dir, web_path)
    }

    /// Existing file addressed relative to the history directory
    pub fn file(&self, relative: &str) -> Result<PathBuf> {
        let path = resolve_web_path(&self.dir, &format!("{}/{}", WEB_PREFIX, relative))
            .ok_or_else(|| Error::invalid_input(format!("invalid history path: {}", relative)))?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::not_found(format!("no such history file: {}", relative)))
        }
    }

    /// Persist a record as `<id>.json`
    pub fn save(&self, record: &HistoryRecord) -> Result<PathBuf> {
        validate_id(&record.id)?;
        let _guard = self.lock.write();
        let path = self.dir.join(format!("{}.json", record.id));
        write_json(&path, record)?;
        info!("Saved history record {}", record.id);
        Ok(path)
    }

    /// Persist a manually assembled record, one file per result path.
    ///
    /// Files are named `<id>_<i>.json` with `i` starting at 1. Returns the
    /// file stems written.
    pub fn save_manual(&self, record: &HistoryRecord) -> Result<Vec<String>> {
        validate_id(&record.id)?;
        let _guard = self.lock.write();

        let mut written = Vec::with_capacity(record.result_local_paths.len());
        for (i, result_path) in record.result_local_paths.iter().enumerate() {
            let mut single = record.clone();
            single.result_local_paths = vec![result_path.clone()];

            let stem = format!("{}_{}", record.id, i + 1);
            write_json(&self.dir.join(format!("{}.json", stem)), &single)?;
            written.push(stem);
        }

        debug!("Saved {} manual history files for {}", written.len(), record.id);
        Ok(written)
    }

    /// List records, newest modification first
    pub fn list(&self, page: usize, limit: usize) -> Result<HistoryPage> {
        let page = page.max(1);
        let limit = limit.max(1);
        let _guard = self.lock.read();

        let mut files = self.record_files()?;
        files.sort_by(|a, b| b.1.cmp(&a.1));

        let total = files.len();
        let records = files
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .filter_map(|(path, _)| match read_record(&path) {
                Ok(record) => Some(HistoryEntry::from(record)),
                Err(e) => {
                    warn!("Skipping unreadable history record {}: {}", path.display(), e);
                    None
                }
            })
            .collect();

        Ok(HistoryPage {
            records,
            total,
            page,
            limit,
            pages: total.div_ceil(limit),
        })
    }

    /// Load a record by exact id
    pub fn get(&self, id: &str) -> Result<HistoryRecord> {
        validate_id(id)?;
        let _guard = self.lock.read();
        let path = self.dir.join(format!("{}.json", id));
        if !path.is_file() {
            return Err(Error::not_found(format!("history record {}", id)));
        }
        read_record(&path)
    }

    /// Delete the first record whose file stem starts with `id_prefix`,
    /// along with every local image it references.
    ///
    /// Returns the number of image files removed.
    pub fn delete(&self, id_prefix: &str) -> Result<usize> {
        validate_id(id_prefix)?;
        let _guard = self.lock.write();

        let mut files = self.record_files()?;
        files.sort_by(|a, b| a.0.cmp(&b.0));
        let json_path = files
            .into_iter()
            .map(|(path, _)| path)
            .find(|path| {
                path.file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|stem| stem.starts_with(id_prefix))
            })
            .ok_or_else(|| Error::not_found(format!("history record {}", id_prefix)))?;

        let record = read_record(&json_path);
        std::fs::remove_file(&json_path)?;

        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Deleted unreadable record {}: {}", json_path.display(), e);
                return Ok(0);
            }
        };

        let mut removed = 0;
        for web_path in record.local_paths() {
            let Some(path) = self.owned_image(web_path) else {
                warn!("Not deleting path outside inputs/ and results/: {}", web_path);
                continue;
            };
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
            }
        }

        info!("Deleted history record {} and {} images", record.id, removed);
        Ok(removed)
    }

    /// Stored image a record may delete: a `.jpg` directly under
    /// `inputs/` or `results/`
    fn owned_image(&self, web_path: &str) -> Option<PathBuf> {
        let path = self.resolve_web_path(web_path)?;
        let parent = path.parent()?;
        let is_jpeg = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg")
            });
        let in_image_dir = parent == self.inputs_dir() || parent == self.results_dir();
        (is_jpeg && in_image_dir).then_some(path)
    }

    fn record_files(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") || !path.is_file() {
                continue;
            }
            let modified = std::fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((path, modified));
        }
        Ok(files)
    }
}

fn validate_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        return Err(Error::invalid_input(format!("invalid record id: {:?}", id)));
    }
    Ok(())
}

fn read_record(path: &Path) -> Result<HistoryRecord> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Write JSON through a temp file and rename so readers never see a
/// partial record
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Absolute, lexically cleaned path
fn absolutize(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut cleaned = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    Ok(cleaned)
}
