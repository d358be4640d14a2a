//! Core types for PixForge

use serde::{Deserialize, Serialize};

/// Default resolution hint when the caller sends none
pub const DEFAULT_SIZE: &str = "2K";

/// Default aspect-ratio hint when the caller sends none
pub const DEFAULT_ASPECT_RATIO: &str = "auto";

/// A single image generation call handed to a provider.
///
/// `size` and `aspect_ratio` are hints that each provider interprets on
/// its own; nothing here validates them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Externally reachable input image URLs, in caller order
    #[serde(default)]
    pub image_urls: Vec<String>,

    /// Text prompt
    pub prompt: String,

    /// Resolution hint ("2K", "4K", ...)
    #[serde(default = "default_size")]
    pub size: String,

    /// Aspect-ratio hint ("auto", "16:9", ...)
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

impl GenerationRequest {
    /// Create a request with default size and aspect ratio
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            image_urls: Vec::new(),
            prompt: prompt.into(),
            size: default_size(),
            aspect_ratio: default_aspect_ratio(),
        }
    }

    /// Set the input image URLs
    pub fn with_images<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image_urls = urls.into_iter().map(Into::into).collect();
        self
    }

    /// Set the size hint
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    /// Set the aspect-ratio hint
    pub fn with_aspect_ratio(mut self, aspect_ratio: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self
    }
}

fn default_size() -> String {
    DEFAULT_SIZE.to_string()
}

fn default_aspect_ratio() -> String {
    DEFAULT_ASPECT_RATIO.to_string()
}

/// Outcome of one provider invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    /// Result image URLs (may be empty, which counts as no result)
    Success(Vec<String>),

    /// Provider-reported failure with a human-readable reason
    Failure(String),
}

impl ProviderOutcome {
    /// Create a failure outcome
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    /// Result URLs if this outcome carries at least one
    pub fn into_urls(self) -> Option<Vec<String>> {
        match self {
            Self::Success(urls) if !urls.is_empty() => Some(urls),
            _ => None,
        }
    }
}

/// What a provider can do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Prompt + images to result images
    Generate,
    /// Source image + face image to one swapped image
    FaceSwap,
}

/// One persisted generation, stored as `<history>/<id>.json`.
///
/// Legacy key names (`image_urls`, `local_input_paths`,
/// `local_result_paths`) are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Unique record id
    #[serde(default = "new_record_id")]
    pub id: String,

    /// Local ISO-8601 creation time
    #[serde(default = "now_iso")]
    pub timestamp: String,

    /// Prompt the images were generated from
    #[serde(default)]
    pub prompt: String,

    /// Size hint used
    #[serde(default = "default_size")]
    pub size: String,

    /// Aspect-ratio hint used
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,

    /// External input URLs sent to the provider
    #[serde(default, alias = "image_urls")]
    pub input_urls: Vec<String>,

    /// Web paths of the local input copies
    #[serde(default, alias = "local_input_paths")]
    pub input_local_paths: Vec<String>,

    /// External result URLs returned by the provider
    #[serde(default)]
    pub result_urls: Vec<String>,

    /// Web paths of the downloaded results
    #[serde(default, alias = "local_result_paths")]
    pub result_local_paths: Vec<String>,

    /// Provider that produced the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Optional title for manually saved records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl HistoryRecord {
    /// Create a fresh record for a completed generation
    pub fn new(request: &GenerationRequest) -> Self {
        Self {
            id: new_record_id(),
            timestamp: now_iso(),
            prompt: request.prompt.clone(),
            size: request.size.clone(),
            aspect_ratio: request.aspect_ratio.clone(),
            input_urls: request.image_urls.clone(),
            input_local_paths: Vec::new(),
            result_urls: Vec::new(),
            result_local_paths: Vec::new(),
            provider: None,
            title: None,
        }
    }

    /// Every local image path this record references
    pub fn local_paths(&self) -> impl Iterator<Item = &str> {
        self.result_local_paths
            .iter()
            .chain(self.input_local_paths.iter())
            .map(String::as_str)
    }
}

fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_iso() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}
