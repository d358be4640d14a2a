//! PixForge Store
//!
//! Local persistence and external upload plumbing:
//! - Upload backends (image host, git repository CDN) behind [`Uploader`]
//! - A persistent path to URL cache in front of the configured backend
//! - The flat JSON history store and storyboard store
//! - Image helpers that normalise everything stored to JPEG

pub mod history;
pub mod images;
pub mod storyboard;
pub mod upload;

pub use history::{HistoryEntry, HistoryPage, HistoryParams, HistoryStore, DEFAULT_PAGE_LIMIT};
pub use storyboard::{SaveStoryboard, Storyboard, StoryboardStore, StoryboardSummary};
pub use upload::{
    build_uploader, normalize_local_path, CachedUpload, CachedUploader, GitCdnConfig, ImgBbConfig,
    UploadBackend, UploadConfig, UploadError, Uploader, CACHE_FILE_NAME,
};
