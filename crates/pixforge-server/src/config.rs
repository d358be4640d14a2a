//! Server configuration

use crate::cli::Cli;
use pixforge_providers::{DispatchSettings, RegistryConfig};
use pixforge_store::UploadConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served for unmatched routes
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    /// History root (records, inputs/, results/, upload cache)
    #[serde(default = "default_history_dir")]
    pub history_dir: PathBuf,

    #[serde(default = "default_storyboard_dir")]
    pub storyboard_dir: PathBuf,

    /// Shared secret; authentication is off when unset
    #[serde(default)]
    pub session_key: Option<String>,

    #[serde(default)]
    pub plugins: PluginSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub upload: UploadConfig,
}

/// Plugin discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default = "default_plugin_dir")]
    pub dir: PathBuf,

    /// Allow-list; absent loads every plugin except `example`
    #[serde(default)]
    pub enabled: Option<Vec<String>>,

    #[serde(default)]
    pub face_swap_plugin: Option<String>,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            dir: default_plugin_dir(),
            enabled: None,
            face_swap_plugin: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(cli);
        if config.dispatch.max_results == 0 {
            warn!("dispatch.max_results is 0, keeping one result per generation");
            config.dispatch.max_results = 1;
        }
        Ok(config)
    }

    /// Apply flag and environment values on top of the file
    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(dir) = &cli.static_dir {
            self.static_dir = Some(dir.clone());
        }
        if let Some(dir) = &cli.history_dir {
            self.history_dir = dir.clone();
        }
        if let Some(dir) = &cli.storyboard_dir {
            self.storyboard_dir = dir.clone();
        }
        if let Some(key) = &cli.session_key {
            self.session_key = Some(key.clone()).filter(|k| !k.is_empty());
        }

        if let Some(dir) = &cli.plugin_dir {
            self.plugins.dir = dir.clone();
        }
        if let Some(raw) = &cli.plugin_enabled {
            self.plugins.enabled = RegistryConfig::parse_enabled(raw).map(|set| {
                let mut names: Vec<String> = set.into_iter().collect();
                names.sort();
                names
            });
        }
        if let Some(name) = &cli.face_swap_plugin {
            self.plugins.face_swap_plugin = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        }

        if let Some(raw) = &cli.fallback_order {
            let order = split_list(raw);
            if !order.is_empty() {
                self.dispatch.default_order = order;
            }
        }

        if let Some(backend) = &cli.upload_backend {
            self.upload.backend = backend.clone();
        }
        if let Some(key) = &cli.imgbb_api_key {
            self.upload.imgbb.api_key = Some(key.clone());
        }
        if let Some(username) = &cli.github_username {
            self.upload.github.username = Some(username.clone());
        }
        if let Some(repo) = &cli.github_repo {
            self.upload.github.repo = Some(repo.clone());
        }
        if let Some(branch) = &cli.github_branch {
            self.upload.github.branch = branch.clone();
        }
        if let Some(path) = &cli.local_repo_path {
            self.upload.github.local_repo_path = Some(path.clone());
        }
    }

    /// Registry settings derived from the plugin section
    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            plugin_dir: Some(self.plugins.dir.clone()),
            enabled: self
                .plugins
                .enabled
                .as_ref()
                .map(|names| names.iter().map(|n| n.trim().to_string()).collect()),
            face_swap_plugin: self.plugins.face_swap_plugin.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            static_dir: None,
            history_dir: default_history_dir(),
            storyboard_dir: default_storyboard_dir(),
            session_key: None,
            plugins: PluginSettings::default(),
            dispatch: DispatchSettings::default(),
            upload: UploadConfig::default(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_history_dir() -> PathBuf {
    PathBuf::from("history")
}

fn default_storyboard_dir() -> PathBuf {
    PathBuf::from("storyboards")
}

fn default_plugin_dir() -> PathBuf {
    PathBuf::from("plugins")
}
