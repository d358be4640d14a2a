//! Directory plugin manifests
//!
//! Each plugin directory carries a `plugin.yaml` describing how to reach
//! an external HTTP/JSON image API. See [`crate::ConfigurableProvider`].

use pixforge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Manifest file name looked up in every plugin directory
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// A parsed `plugin.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    /// Registered name; the directory name when absent
    #[serde(default)]
    pub name: Option<String>,

    /// Per-call HTTP timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Generation endpoint; required for the plugin to load
    #[serde(default)]
    pub generate: Option<EndpointSpec>,

    /// Optional face swap endpoint
    #[serde(default)]
    pub swap_face: Option<EndpointSpec>,
}

impl PluginManifest {
    /// Load a manifest from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a manifest from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("invalid plugin manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        for spec in self.generate.iter().chain(self.swap_face.iter()) {
            if !(spec.endpoint.starts_with("http://") || spec.endpoint.starts_with("https://")) {
                return Err(Error::config(format!(
                    "endpoint '{}' must be an http(s) URL",
                    spec.endpoint
                )));
            }
        }
        Ok(())
    }
}

/// One HTTP endpoint call described declaratively
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointSpec {
    /// Target URL
    pub endpoint: String,

    /// HTTP method
    #[serde(default)]
    pub method: HttpMethod,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Header to send the key in; bearer auth when absent
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Extra static headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// JSON body template with `{{placeholder}}` strings
    #[serde(default)]
    pub body: Value,

    /// Dot path to the part of the response holding result URLs
    #[serde(default)]
    pub result_path: Option<String>,
}

/// Supported request methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Put,
}
