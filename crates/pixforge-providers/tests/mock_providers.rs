//! Mock providers for testing
//!
//! Configurable implementations of the ImageProvider trait for exercising
//! the registry and the fallback dispatcher.

use async_trait::async_trait;
use pixforge_core::{Capability, GenerationRequest, ProviderOutcome, Result};
use pixforge_providers::ImageProvider;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// What a mock returns from generate
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Urls(Vec<String>),
    Fail(String),
    Panic,
}

/// A configurable mock provider
pub struct MockProvider {
    name: String,
    behavior: MockBehavior,
    capabilities: Vec<Capability>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockProvider {
    /// Provider returning the given URLs
    pub fn returning(name: &str, urls: &[&str]) -> Self {
        Self::with_behavior(
            name,
            MockBehavior::Urls(urls.iter().map(|u| u.to_string()).collect()),
        )
    }

    /// Provider returning an empty list
    pub fn empty(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Urls(Vec::new()))
    }

    /// Provider reporting a failure
    pub fn failing(name: &str, reason: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Fail(reason.to_string()))
    }

    /// Provider that panics inside generate
    pub fn panicking(name: &str) -> Self {
        Self::with_behavior(name, MockBehavior::Panic)
    }

    pub fn with_behavior(name: &str, behavior: MockBehavior) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            capabilities: vec![Capability::Generate],
            simulated_latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set simulated latency for this provider
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Also advertise face swap
    pub fn with_face_swap(mut self) -> Self {
        self.capabilities.push(Capability::FaceSwap);
        self
    }

    /// Get the number of times generate was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    async fn generate(&self, _request: &GenerationRequest) -> ProviderOutcome {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        match &self.behavior {
            MockBehavior::Urls(urls) => ProviderOutcome::Success(urls.clone()),
            MockBehavior::Fail(reason) => ProviderOutcome::failure(reason.clone()),
            MockBehavior::Panic => panic!("mock provider {} exploded", self.name),
        }
    }

    async fn swap_face(&self, source_url: &str, face_url: &str) -> Result<String> {
        Ok(format!("{}?face={}", source_url, face_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixforge_providers::{
        AttemptStatus, DispatchSettings, FallbackDispatcher, PluginRegistry,
    };
    use proptest::prelude::*;
    use std::sync::Arc;

    fn dispatcher(providers: Vec<Arc<MockProvider>>) -> FallbackDispatcher {
        dispatcher_with(providers, DispatchSettings::default())
    }

    fn dispatcher_with(
        providers: Vec<Arc<MockProvider>>,
        settings: DispatchSettings,
    ) -> FallbackDispatcher {
        let providers: Vec<Arc<dyn ImageProvider>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn ImageProvider>)
            .collect();
        FallbackDispatcher::new(Arc::new(PluginRegistry::from_providers(providers)), settings)
    }

    fn order(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("a cat in a hat").with_images(["http://cdn/a.jpg"])
    }

    #[tokio::test]
    async fn test_absent_then_success() {
        let p2 = Arc::new(MockProvider::returning("p2", &["http://x/r.jpg"]));
        let dispatcher = dispatcher(vec![p2.clone()]);

        let urls = dispatcher
            .generate_with_fallback(&request(), Some(&order(&["p1", "p2"])))
            .await;

        assert_eq!(urls, vec!["http://x/r.jpg"]);
        assert_eq!(p2.call_count(), 1);
    }

    #[tokio::test]
    async fn test_panicking_provider_returns_empty() {
        let p1 = Arc::new(MockProvider::panicking("p1"));
        let dispatcher = dispatcher(vec![p1.clone()]);

        let report = dispatcher.dispatch(&request(), Some(&order(&["p1"]))).await;

        assert!(report.result_urls.is_empty());
        assert_eq!(p1.call_count(), 1);
        assert!(matches!(
            &report.attempts[0].status,
            AttemptStatus::Panicked(msg) if msg.contains("exploded")
        ));
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let a = Arc::new(MockProvider::failing("a", "quota exceeded"));
        let b = Arc::new(MockProvider::empty("b"));
        let c = Arc::new(MockProvider::returning("c", &["http://x/c1.jpg", "http://x/c2.jpg"]));
        let d = Arc::new(MockProvider::returning("d", &["http://x/d.jpg"]));
        let dispatcher = dispatcher(vec![a.clone(), b.clone(), c.clone(), d.clone()]);

        let report = dispatcher
            .dispatch(&request(), Some(&order(&["a", "b", "c", "d"])))
            .await;

        assert_eq!(report.result_urls, vec!["http://x/c1.jpg", "http://x/c2.jpg"]);
        assert_eq!(report.provider.as_deref(), Some("c"));
        assert_eq!((a.call_count(), b.call_count(), c.call_count()), (1, 1, 1));
        assert_eq!(d.call_count(), 0);

        let statuses: Vec<&str> = report.attempts.iter().map(|a| a.status.label()).collect();
        assert_eq!(statuses, vec!["failure", "empty", "success"]);
    }

    #[tokio::test]
    async fn test_all_fail_invokes_each_once() {
        let a = Arc::new(MockProvider::failing("a", "down"));
        let b = Arc::new(MockProvider::empty("b"));
        let dispatcher = dispatcher(vec![a.clone(), b.clone()]);

        let urls = dispatcher
            .generate_with_fallback(&request(), Some(&order(&["a", "missing", "b"])))
            .await;

        assert!(urls.is_empty());
        assert_eq!(a.call_count(), 1);
        assert_eq!(b.call_count(), 1);
    }

    #[tokio::test]
    async fn test_default_order_used_when_absent() {
        let nano = Arc::new(MockProvider::failing("nano_banana", "busy"));
        let rh = Arc::new(MockProvider::returning("rh_official", &["http://rh/1.png"]));
        let dispatcher = dispatcher(vec![nano.clone(), rh.clone()]);

        let report = dispatcher.dispatch(&request(), None).await;

        assert_eq!(report.provider.as_deref(), Some("rh_official"));
        assert_eq!(nano.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_times_out() {
        let slow = Arc::new(
            MockProvider::returning("slow", &["http://x/late.jpg"])
                .with_latency(Duration::from_secs(30)),
        );
        let fast = Arc::new(MockProvider::returning("fast", &["http://x/fast.jpg"]));
        let settings = DispatchSettings {
            call_timeout_secs: 5,
            ..DispatchSettings::default()
        };
        let dispatcher = dispatcher_with(vec![slow.clone(), fast.clone()], settings);

        let report = dispatcher
            .dispatch(&request(), Some(&order(&["slow", "fast"])))
            .await;

        assert_eq!(report.attempts[0].status, AttemptStatus::TimedOut);
        assert_eq!(report.result_urls, vec!["http://x/fast.jpg"]);
    }

    #[tokio::test]
    async fn test_results_capped() {
        let urls: Vec<String> = (0..12).map(|i| format!("http://x/{}.jpg", i)).collect();
        let many = Arc::new(MockProvider::with_behavior("many", MockBehavior::Urls(urls)));
        let settings = DispatchSettings {
            max_results: 3,
            ..DispatchSettings::default()
        };
        let dispatcher = dispatcher_with(vec![many], settings);

        let result = dispatcher
            .generate_with_fallback(&request(), Some(&order(&["many"])))
            .await;

        assert_eq!(result, vec!["http://x/0.jpg", "http://x/1.jpg", "http://x/2.jpg"]);
    }

    #[tokio::test]
    async fn test_zero_cap_keeps_one_result() {
        let urls = vec!["http://x/0.jpg".to_string(), "http://x/1.jpg".to_string()];
        let two = Arc::new(MockProvider::with_behavior("two", MockBehavior::Urls(urls)));
        let settings = DispatchSettings {
            max_results: 0,
            ..DispatchSettings::default()
        };
        let dispatcher = dispatcher_with(vec![two], settings);

        let report = dispatcher.dispatch(&request(), Some(&order(&["two"]))).await;

        assert!(report.succeeded());
        assert_eq!(report.result_urls, vec!["http://x/0.jpg"]);
        assert_eq!(report.provider.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_face_swap_resolution() {
        let swapper = Arc::new(MockProvider::empty("swapper").with_face_swap());
        let plain = Arc::new(MockProvider::empty("plain"));
        let providers: Vec<Arc<dyn ImageProvider>> = vec![swapper, plain];

        let registry = PluginRegistry::from_providers(providers.clone())
            .with_face_swap_plugin("swapper");
        let provider = registry.face_swap().expect("swapper should resolve");
        let url = provider.swap_face("http://s/1.jpg", "http://f/2.jpg").await.unwrap();
        assert_eq!(url, "http://s/1.jpg?face=http://f/2.jpg");

        let registry = PluginRegistry::from_providers(providers).with_face_swap_plugin("plain");
        assert!(registry.get("plain").is_some());
        assert!(registry.face_swap().is_none());
    }

    #[derive(Debug, Clone, Copy)]
    enum Kind {
        Ok,
        Empty,
        Fail,
        Panic,
        Absent,
    }

    fn kind_strategy() -> impl Strategy<Value = Kind> {
        prop_oneof![
            Just(Kind::Ok),
            Just(Kind::Empty),
            Just(Kind::Fail),
            Just(Kind::Panic),
            Just(Kind::Absent),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_returns_first_success_and_stops(kinds in prop::collection::vec(kind_strategy(), 0..6)) {
            let mut providers = Vec::new();
            let mut names = Vec::new();
            for (i, kind) in kinds.iter().enumerate() {
                let name = format!("p{}", i);
                let url = format!("http://x/{}.jpg", i);
                let provider = match kind {
                    Kind::Ok => Some(MockProvider::returning(&name, &[url.as_str()])),
                    Kind::Empty => Some(MockProvider::empty(&name)),
                    Kind::Fail => Some(MockProvider::failing(&name, "nope")),
                    Kind::Panic => Some(MockProvider::panicking(&name)),
                    Kind::Absent => None,
                };
                providers.push(provider.map(Arc::new));
                names.push(name);
            }

            let present: Vec<Arc<MockProvider>> = providers.iter().flatten().cloned().collect();
            let dispatcher = dispatcher(present);

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let urls = runtime.block_on(dispatcher.generate_with_fallback(&request(), Some(&names)));

            let winner = kinds.iter().position(|k| matches!(k, Kind::Ok));
            match winner {
                Some(w) => {
                    prop_assert_eq!(urls, vec![format!("http://x/{}.jpg", w)]);
                    for (i, provider) in providers.iter().enumerate() {
                        if let Some(p) = provider {
                            let expected = if i <= w { 1 } else { 0 };
                            prop_assert_eq!(p.call_count(), expected);
                        }
                    }
                }
                None => {
                    prop_assert!(urls.is_empty());
                    for provider in providers.iter().flatten() {
                        prop_assert_eq!(provider.call_count(), 1);
                    }
                }
            }
        }
    }
}
