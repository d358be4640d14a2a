//! Fallback dispatcher
//!
//! Tries providers in caller order until one returns a non-empty result.
//! Missing providers, failures, empty results, timeouts and panics are all
//! logged and treated as "no result" for that candidate.

use crate::provider::ImageProvider;
use crate::registry::PluginRegistry;
use futures::FutureExt;
use pixforge_core::{GenerationRequest, ProviderOutcome};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Order used when a request names none
    #[serde(default = "default_order")]
    pub default_order: Vec<String>,

    /// Timeout applied to each provider call
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Cap on URLs kept from a winning provider
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_order() -> Vec<String> {
    vec!["nano_banana".to_string(), "rh_official".to_string()]
}

fn default_call_timeout_secs() -> u64 {
    180
}

fn default_max_results() -> usize {
    8
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_order: default_order(),
            call_timeout_secs: default_call_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptStatus {
    /// Name not in the registry
    Missing,
    /// Returned at least one URL
    Succeeded,
    /// Returned an empty list
    Empty,
    /// Reported a failure
    Failed(String),
    /// Exceeded the per-call timeout
    TimedOut,
    /// Panicked during the call
    Panicked(String),
}

impl AttemptStatus {
    /// Short label used in logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Succeeded => "success",
            Self::Empty => "empty",
            Self::Failed(_) => "failure",
            Self::TimedOut => "timeout",
            Self::Panicked(_) => "panic",
        }
    }
}

/// One candidate attempt
#[derive(Debug, Clone)]
pub struct Attempt {
    pub provider: String,
    pub status: AttemptStatus,
    pub elapsed: Duration,
}

/// Result of a dispatch with per-attempt detail
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Result URLs; empty when every candidate failed
    pub result_urls: Vec<String>,

    /// Provider that produced the result
    pub provider: Option<String>,

    /// Attempts in order
    pub attempts: Vec<Attempt>,
}

impl DispatchReport {
    /// Whether any candidate produced a result
    pub fn succeeded(&self) -> bool {
        !self.result_urls.is_empty()
    }
}

/// Sequential provider fallback over a shared registry
#[derive(Debug, Clone)]
pub struct FallbackDispatcher {
    registry: Arc<PluginRegistry>,
    settings: DispatchSettings,
}

impl FallbackDispatcher {
    /// Create a dispatcher; `max_results` is at least one
    pub fn new(registry: Arc<PluginRegistry>, mut settings: DispatchSettings) -> Self {
        settings.max_results = settings.max_results.max(1);
        Self { registry, settings }
    }

    /// Try providers in order; an empty result means all providers failed
    pub async fn generate_with_fallback(
        &self,
        request: &GenerationRequest,
        order: Option<&[String]>,
    ) -> Vec<String> {
        self.dispatch(request, order).await.result_urls
    }

    /// Try providers in order and report every attempt
    pub async fn dispatch(
        &self,
        request: &GenerationRequest,
        order: Option<&[String]>,
    ) -> DispatchReport {
        let order = order.unwrap_or(self.settings.default_order.as_slice());
        let plugins = self.registry.snapshot();
        let mut report = DispatchReport::default();

        for name in order {
            let Some(provider) = plugins.get(name) else {
                warn!("Provider {} not loaded, skipping", name);
                report.attempts.push(Attempt {
                    provider: name.clone(),
                    status: AttemptStatus::Missing,
                    elapsed: Duration::ZERO,
                });
                metrics::counter!(
                    "pixforge_provider_attempts_total",
                    "provider" => name.clone(),
                    "outcome" => "missing"
                )
                .increment(1);
                continue;
            };

            info!("Trying provider: {}", name);
            let start = Instant::now();
            let (status, urls) = self.invoke(provider, request).await;
            let elapsed = start.elapsed();

            metrics::counter!(
                "pixforge_provider_attempts_total",
                "provider" => name.clone(),
                "outcome" => status.label()
            )
            .increment(1);
            metrics::histogram!("pixforge_provider_latency_ms", "provider" => name.clone())
                .record(elapsed.as_secs_f64() * 1000.0);

            report.attempts.push(Attempt {
                provider: name.clone(),
                status: status.clone(),
                elapsed,
            });

            match status {
                AttemptStatus::Succeeded => {
                    let mut urls = urls;
                    if urls.len() > self.settings.max_results {
                        warn!(
                            "Provider {} returned {} results, keeping the first {}",
                            name,
                            urls.len(),
                            self.settings.max_results
                        );
                        urls.truncate(self.settings.max_results);
                    }
                    info!(
                        "Provider {} succeeded with {} results in {:?}",
                        name,
                        urls.len(),
                        elapsed
                    );
                    report.result_urls = urls;
                    report.provider = Some(name.clone());
                    return report;
                }
                AttemptStatus::Empty => warn!("Provider {} returned no results", name),
                AttemptStatus::Failed(reason) => warn!("Provider {} failed: {}", name, reason),
                AttemptStatus::TimedOut => {
                    warn!("Provider {} timed out after {:?}", name, elapsed)
                }
                AttemptStatus::Panicked(detail) => {
                    warn!("Provider {} panicked: {}", name, detail)
                }
                AttemptStatus::Missing => {}
            }
        }

        warn!("All providers failed ({} tried)", report.attempts.len());
        report
    }

    async fn invoke(
        &self,
        provider: &Arc<dyn ImageProvider>,
        request: &GenerationRequest,
    ) -> (AttemptStatus, Vec<String>) {
        let timeout = Duration::from_secs(self.settings.call_timeout_secs);
        let guarded = AssertUnwindSafe(provider.generate(request)).catch_unwind();

        match tokio::time::timeout(timeout, guarded).await {
            Err(_) => (AttemptStatus::TimedOut, Vec::new()),
            Ok(Err(payload)) => (AttemptStatus::Panicked(panic_message(&*payload)), Vec::new()),
            Ok(Ok(ProviderOutcome::Failure(reason))) => (AttemptStatus::Failed(reason), Vec::new()),
            Ok(Ok(outcome)) => match outcome.into_urls() {
                Some(urls) => (AttemptStatus::Succeeded, urls),
                None => (AttemptStatus::Empty, Vec::new()),
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = DispatchSettings::default();
        assert_eq!(settings.default_order, vec!["nano_banana", "rh_official"]);
        assert_eq!(settings.call_timeout_secs, 180);
        assert_eq!(settings.max_results, 8);
    }

    #[test]
    fn test_settings_from_partial_yaml() {
        let settings: DispatchSettings = serde_yaml::from_str("call_timeout_secs: 30\n").unwrap();
        assert_eq!(settings.call_timeout_secs, 30);
        assert_eq!(settings.max_results, 8);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[tokio::test]
    async fn test_empty_registry_returns_empty() {
        let dispatcher = FallbackDispatcher::new(
            Arc::new(PluginRegistry::from_providers(Vec::new())),
            DispatchSettings::default(),
        );
        let report = dispatcher.dispatch(&GenerationRequest::new("x"), None).await;
        assert!(!report.succeeded());
        assert_eq!(report.attempts.len(), 2);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.status == AttemptStatus::Missing));
    }
}
