//! Shared application state

use crate::config::ServerConfig;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use pixforge_providers::{FallbackDispatcher, PluginRegistry};
use pixforge_store::{
    build_uploader, CachedUploader, HistoryStore, StoryboardStore, Uploader, CACHE_FILE_NAME,
};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::info;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Provider registry
    pub registry: Arc<PluginRegistry>,

    /// Ordered provider dispatch over the registry
    pub dispatcher: Arc<FallbackDispatcher>,

    /// Configured upload backend
    pub uploader: Arc<dyn Uploader>,

    /// Same backend behind the persistent URL cache
    pub upload_cache: Arc<CachedUploader>,

    pub history: Arc<HistoryStore>,

    pub storyboards: Arc<StoryboardStore>,

    /// Admission control for generation
    pub generation: Arc<GenerationSlot>,

    /// HTTP client for result downloads
    pub http_client: reqwest::Client,

    /// Prometheus handle; `/metrics` is empty without one
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Build state from configuration, scanning the plugin directory
    pub fn new(config: ServerConfig, metrics_handle: Option<PrometheusHandle>) -> Result<Self> {
        let registry = Arc::new(PluginRegistry::new(config.registry_config()));
        info!(
            "Provider registry ready with {} provider(s): {:?}",
            registry.len(),
            registry.names()
        );

        let uploader = build_uploader(&config.upload);
        info!("Upload backend: {}", uploader.backend());

        Self::from_parts(config, registry, uploader, metrics_handle)
    }

    /// Build state around an existing registry and uploader
    pub fn from_parts(
        config: ServerConfig,
        registry: Arc<PluginRegistry>,
        uploader: Arc<dyn Uploader>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self> {
        let history = Arc::new(HistoryStore::new(&config.history_dir)?);
        let storyboards = Arc::new(StoryboardStore::new(&config.storyboard_dir)?);
        let upload_cache = Arc::new(CachedUploader::new(
            uploader.clone(),
            history.dir().join(CACHE_FILE_NAME),
            history.dir(),
        ));
        let dispatcher = Arc::new(FallbackDispatcher::new(
            registry.clone(),
            config.dispatch.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            uploader,
            upload_cache,
            history,
            storyboards,
            generation: Arc::new(GenerationSlot::new()),
            http_client: reqwest::Client::new(),
            metrics_handle,
        })
    }
}

/// Single-permit admission gate for generation.
///
/// Callers never queue: `try_acquire` either hands out the only ticket or
/// returns `None`.
#[derive(Debug)]
pub struct GenerationSlot {
    semaphore: Arc<Semaphore>,
}

impl GenerationSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Take the slot if it is free
    pub fn try_acquire(&self) -> Option<GenerationTicket> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GenerationTicket { _permit: permit })
    }

    /// Whether a generation is in flight
    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for GenerationSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Held for the duration of one generation; dropping it frees the slot
#[derive(Debug)]
pub struct GenerationTicket {
    _permit: OwnedSemaphorePermit,
}

impl GenerationTicket {
    /// Free the slot explicitly
    pub fn release(self) {}
}
