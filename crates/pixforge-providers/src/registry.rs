//! Provider registry: discovery, enable filtering and atomic reload

use crate::configurable::ConfigurableProvider;
use crate::example::{ExampleProvider, EXAMPLE_PROVIDER};
use crate::manifest::{PluginManifest, MANIFEST_FILE};
use crate::provider::ImageProvider;
use parking_lot::RwLock;
use pixforge_core::{Capability, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name to provider mapping
pub type PluginMap = HashMap<String, Arc<dyn ImageProvider>>;

/// Registry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory scanned for plugin subdirectories
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,

    /// Allow-list of plugin names; `None` loads everything except `example`
    #[serde(default)]
    pub enabled: Option<HashSet<String>>,

    /// Plugin designated for face swapping
    #[serde(default)]
    pub face_swap_plugin: Option<String>,
}

impl RegistryConfig {
    /// Parse a comma-separated allow-list; blank input means no filter
    pub fn parse_enabled(raw: &str) -> Option<HashSet<String>> {
        let names: HashSet<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            None
        } else {
            Some(names)
        }
    }
}

/// Whether a candidate name passes the reserved-name and enable filters
pub fn is_enabled(name: &str, enabled: Option<&HashSet<String>>) -> bool {
    if name.starts_with("__") || name.starts_with('.') {
        return false;
    }
    match enabled {
        Some(set) => set.contains(name),
        None => name != EXAMPLE_PROVIDER,
    }
}

/// The built-in registration table
pub fn builtin_providers() -> Vec<Arc<dyn ImageProvider>> {
    vec![Arc::new(ExampleProvider::new())]
}

/// Scan the immediate subdirectories of `base_dir` for plugin manifests.
///
/// Faulty candidates are logged and excluded; discovery never fails as a
/// whole. A missing base directory yields an empty map.
pub fn discover(base_dir: &Path, enabled: Option<&HashSet<String>>) -> PluginMap {
    let mut plugins = PluginMap::new();

    let entries = match std::fs::read_dir(base_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Plugin directory {} unreadable: {}", base_dir.display(), e);
            return plugins;
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let Some(dir_name) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if !is_enabled(dir_name, enabled) {
            debug!("Skipping plugin directory: {}", dir_name);
            continue;
        }

        match load_plugin(&dir, dir_name) {
            Ok(provider) => {
                info!("✓ Loaded plugin: {}", provider.name());
                let name = provider.name().to_string();
                if plugins.insert(name.clone(), provider).is_some() {
                    warn!(
                        "Plugin {} in {} replaces an earlier plugin with the same name",
                        name, dir_name
                    );
                }
            }
            Err(e) => {
                warn!("✗ Failed to load plugin {}: {}", dir_name, e);
            }
        }
    }

    plugins
}

fn load_plugin(dir: &Path, dir_name: &str) -> Result<Arc<dyn ImageProvider>> {
    let manifest = PluginManifest::from_file(&dir.join(MANIFEST_FILE))?;
    let name = manifest
        .name
        .clone()
        .unwrap_or_else(|| dir_name.to_string());
    Ok(Arc::new(ConfigurableProvider::new(name, manifest)?))
}

/// Registry of generation providers.
///
/// Readers always see a complete map: [`PluginRegistry::reload`] builds a
/// fresh map and swaps the shared reference.
pub struct PluginRegistry {
    config: RegistryConfig,
    builtins: Vec<Arc<dyn ImageProvider>>,
    plugins: RwLock<Arc<PluginMap>>,
}

impl PluginRegistry {
    /// Create a registry with the built-in table and run discovery
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_builtins(config, builtin_providers())
    }

    /// Create a registry with a custom registration table and run discovery
    pub fn with_builtins(config: RegistryConfig, builtins: Vec<Arc<dyn ImageProvider>>) -> Self {
        let registry = Self {
            config,
            builtins,
            plugins: RwLock::new(Arc::new(PluginMap::new())),
        };
        registry.reload();
        registry
    }

    /// Create a registry holding exactly the given providers
    pub fn from_providers(providers: Vec<Arc<dyn ImageProvider>>) -> Self {
        let plugins: PluginMap = providers
            .into_iter()
            .map(|provider| (provider.name().to_string(), provider))
            .collect();

        Self {
            config: RegistryConfig::default(),
            builtins: Vec::new(),
            plugins: RwLock::new(Arc::new(plugins)),
        }
    }

    /// Set the face swap plugin name
    pub fn with_face_swap_plugin(mut self, name: impl Into<String>) -> Self {
        self.config.face_swap_plugin = Some(name.into());
        self
    }

    /// Rebuild the provider map from scratch and swap it in.
    ///
    /// Returns the number of loaded providers.
    pub fn reload(&self) -> usize {
        let enabled = self.config.enabled.as_ref();
        match enabled {
            Some(set) => {
                let mut names: Vec<_> = set.iter().collect();
                names.sort();
                info!("Plugin allow-list: {:?}", names);
            }
            None => info!("No plugin allow-list set, loading all except example"),
        }

        let mut plugins: PluginMap = self
            .builtins
            .iter()
            .filter(|provider| is_enabled(provider.name(), enabled))
            .map(|provider| (provider.name().to_string(), Arc::clone(provider)))
            .collect();

        if let Some(dir) = &self.config.plugin_dir {
            for (name, provider) in discover(dir, enabled) {
                if plugins.contains_key(&name) {
                    info!("Plugin directory overrides built-in provider: {}", name);
                }
                plugins.insert(name, provider);
            }
        }

        let count = plugins.len();
        *self.plugins.write() = Arc::new(plugins);

        info!("Plugin registry initialized with {} providers", count);
        count
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageProvider>> {
        self.plugins.read().get(name).cloned()
    }

    /// Current map; unaffected by later reloads
    pub fn snapshot(&self) -> Arc<PluginMap> {
        Arc::clone(&self.plugins.read())
    }

    /// Sorted provider names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of loaded providers
    pub fn len(&self) -> usize {
        self.plugins.read().len()
    }

    /// Whether no provider is loaded
    pub fn is_empty(&self) -> bool {
        self.plugins.read().is_empty()
    }

    /// Resolve the configured face swap provider.
    ///
    /// `None` when unconfigured, not loaded, or lacking the capability.
    pub fn face_swap(&self) -> Option<Arc<dyn ImageProvider>> {
        let name = self.config.face_swap_plugin.as_deref()?;
        let provider = self.get(name)?;
        if provider.supports(Capability::FaceSwap) {
            Some(provider)
        } else {
            debug!("Plugin {} has no face swap capability", name);
            None
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("config", &self.config)
            .field("providers", &self.names())
            .finish()
    }
}
