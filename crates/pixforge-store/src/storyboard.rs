//! Storyboard persistence
//!
//! A storyboard is an ordered list of panels, each referencing image paths.
//! Stored as `<dir>/<id>.json`.

use crate::history::write_json;
use pixforge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Title shown for storyboards saved without one
pub const DEFAULT_TITLE: &str = "Untitled storyboard";

/// Incoming save request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveStoryboard {
    #[serde(default)]
    pub panels: Option<Vec<Value>>,

    #[serde(default)]
    pub title: Option<String>,

    /// Existing id to overwrite; a new id is generated when absent
    #[serde(default)]
    pub id: Option<String>,
}

/// Stored storyboard
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Storyboard {
    #[serde(default)]
    pub title: String,
    pub id: String,
    #[serde(rename = "type", default = "storyboard_type")]
    pub kind: String,
    #[serde(default)]
    pub timestamp: String,
    pub panels: Vec<Value>,
}

fn storyboard_type() -> String {
    "storyboard".to_string()
}

/// Listing entry
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StoryboardSummary {
    pub id: String,
    pub title: String,
    pub timestamp: String,
}

/// Storyboard directory owner
#[derive(Debug, Clone)]
pub struct StoryboardStore {
    dir: PathBuf,
}

impl StoryboardStore {
    /// Open (and create) the storyboard directory
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Validate and persist; returns the storyboard id
    pub fn save(&self, request: SaveStoryboard) -> Result<String> {
        let panels = request
            .panels
            .ok_or_else(|| Error::invalid_input("panels are required"))?;
        validate_panels(&panels)?;

        let id = match request.id.filter(|id| !id.trim().is_empty()) {
            Some(id) => {
                validate_id(&id)?;
                id
            }
            None => new_storyboard_id(),
        };

        let storyboard = Storyboard {
            title: request.title.unwrap_or_default(),
            id: id.clone(),
            kind: storyboard_type(),
            timestamp: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            panels,
        };

        write_json(&self.dir.join(format!("{}.json", id)), &storyboard)?;
        info!("Saved storyboard {}", id);
        Ok(id)
    }

    /// Summaries sorted by timestamp, newest first
    pub fn list(&self) -> Result<Vec<StoryboardSummary>> {
        let mut summaries = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_storyboard(&path) {
                Ok(sb) => summaries.push(StoryboardSummary {
                    id: sb.id,
                    title: if sb.title.is_empty() {
                        DEFAULT_TITLE.to_string()
                    } else {
                        sb.title
                    },
                    timestamp: sb.timestamp,
                }),
                Err(e) => warn!("Skipping unreadable storyboard {}: {}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    /// Load one storyboard as stored
    pub fn load(&self, id: &str) -> Result<Value> {
        validate_id(id)?;
        let path = self.dir.join(format!("{}.json", id));
        if !path.is_file() {
            return Err(Error::not_found(format!("storyboard {}", id)));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn validate_panels(panels: &[Value]) -> Result<()> {
    for panel in panels {
        let images = panel
            .get("images")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::invalid_input("panel images must be an array"))?;

        let all_valid = images
            .iter()
            .all(|img| img.as_str().is_some_and(|s| !s.trim().is_empty()));
        if !all_valid {
            return Err(Error::invalid_input(
                "panel image references must be non-empty strings",
            ));
        }
    }
    Ok(())
}

fn validate_id(id: &str) -> Result<()> {
    if id.contains(['/', '\\']) || id.contains("..") || id.is_empty() {
        return Err(Error::invalid_input(format!("invalid storyboard id: {:?}", id)));
    }
    Ok(())
}

fn new_storyboard_id() -> String {
    let uuid = uuid::Uuid::new_v4().to_string();
    format!(
        "sb_{}_{}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        &uuid[..8]
    )
}

fn read_storyboard(path: &Path) -> Result<Storyboard> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request(panels: Value) -> SaveStoryboard {
        SaveStoryboard {
            panels: serde_json::from_value(panels).ok(),
            ..SaveStoryboard::default()
        }
    }

    #[test]
    fn test_save_generates_id_and_loads() {
        let tmp = TempDir::new().unwrap();
        let store = StoryboardStore::new(tmp.path()).unwrap();

        let id = store
            .save(request(json!([{"images": ["/history/results/a.jpg"], "caption": "one"}])))
            .unwrap();
        assert!(id.starts_with("sb_"));
        assert_eq!(id.len(), "sb_20240101_120000_".len() + 8);

        let loaded = store.load(&id).unwrap();
        assert_eq!(loaded["type"], "storyboard");
        assert_eq!(loaded["panels"][0]["caption"], "one");
    }

    #[test]
    fn test_save_rejects_bad_panels() {
        let tmp = TempDir::new().unwrap();
        let store = StoryboardStore::new(tmp.path()).unwrap();

        assert!(store.save(SaveStoryboard::default()).is_err());
        assert!(store.save(request(json!([{"images": "a.jpg"}]))).is_err());
        assert!(store.save(request(json!([{"images": ["  "]}]))).is_err());
        assert!(store.save(request(json!([{"images": [3]}]))).is_err());
    }

    #[test]
    fn test_list_sorted_with_default_title() {
        let tmp = TempDir::new().unwrap();
        let store = StoryboardStore::new(tmp.path()).unwrap();

        std::fs::write(
            tmp.path().join("old.json"),
            json!({"id": "old", "timestamp": "2024-01-01T00:00:00", "panels": []}).to_string(),
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("new.json"),
            json!({"id": "new", "title": "Trip", "timestamp": "2025-01-01T00:00:00", "panels": []})
                .to_string(),
        )
        .unwrap();

        let list = store.list().unwrap();
        assert_eq!(list[0].id, "new");
        assert_eq!(list[0].title, "Trip");
        assert_eq!(list[1].title, DEFAULT_TITLE);
    }

    #[test]
    fn test_load_rejects_traversal_and_missing() {
        let tmp = TempDir::new().unwrap();
        let store = StoryboardStore::new(tmp.path()).unwrap();
        assert!(matches!(store.load("../etc"), Err(Error::InvalidInput(_))));
        assert!(store.load("missing").unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_with_explicit_id_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = StoryboardStore::new(tmp.path()).unwrap();
        let mut req = request(json!([]));
        req.id = Some("sb_fixed".into());
        req.title = Some("v1".into());
        store.save(req.clone()).unwrap();
        req.title = Some("v2".into());
        store.save(req).unwrap();

        assert_eq!(store.load("sb_fixed").unwrap()["title"], "v2");
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
