//! PixForge Providers
//!
//! Pluggable image generation backends and the fallback dispatcher that
//! drives them.
//!
//! Providers come from two sources:
//! - A built-in registration table (currently the `example` placeholder)
//! - Directory plugins, each a subdirectory with a `plugin.yaml` manifest
//!   describing an HTTP/JSON API
//!
//! Both pass through the same allow-list. The dispatcher tries providers in
//! order and returns the first non-empty result.

pub mod configurable;
pub mod dispatcher;
pub mod example;
pub mod manifest;
pub mod provider;
pub mod registry;

pub use configurable::ConfigurableProvider;
pub use dispatcher::{Attempt, AttemptStatus, DispatchReport, DispatchSettings, FallbackDispatcher};
pub use example::{ExampleProvider, EXAMPLE_PROVIDER};
pub use manifest::{EndpointSpec, HttpMethod, PluginManifest, MANIFEST_FILE};
pub use provider::ImageProvider;
pub use registry::{builtin_providers, discover, is_enabled, PluginMap, PluginRegistry, RegistryConfig};
