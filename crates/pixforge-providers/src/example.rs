//! Placeholder provider returning a picsum.photos image
//!
//! Only loaded when `example` is explicitly enabled. Useful for exercising
//! the full generate flow without provider credentials.

use crate::provider::ImageProvider;
use async_trait::async_trait;
use pixforge_core::{GenerationRequest, ProviderOutcome};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::{info, warn};

/// Registered name of the placeholder provider
pub const EXAMPLE_PROVIDER: &str = "example";

const PICSUM_BASE: &str = "https://picsum.photos";

/// Placeholder image provider
#[derive(Debug, Clone)]
pub struct ExampleProvider {
    client: reqwest::Client,
    base_url: String,
}

impl ExampleProvider {
    /// Create the provider against picsum.photos
    pub fn new() -> Self {
        Self::with_base_url(PICSUM_BASE)
    }

    /// Create the provider against another placeholder host
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Placeholder URL for a request
    pub fn placeholder_url(&self, request: &GenerationRequest) -> String {
        let (width, height) = dimensions(&request.size, &request.aspect_ratio);

        let mut hasher = DefaultHasher::new();
        request.prompt.hash(&mut hasher);
        let seed = hasher.finish() % 1000;

        format!(
            "{}/{}/{}?w={}&h={}&random={}",
            self.base_url, width, height, width, height, seed
        )
    }
}

impl Default for ExampleProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn dimensions(size: &str, aspect_ratio: &str) -> (u32, u32) {
    let (width, height) = match size {
        "4K" => (3840, 2160),
        _ => (1920, 1080),
    };
    match aspect_ratio {
        "1:1" => (width, width),
        _ => (width, height),
    }
}

#[async_trait]
impl ImageProvider for ExampleProvider {
    fn name(&self) -> &str {
        EXAMPLE_PROVIDER
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderOutcome {
        let url = self.placeholder_url(request);
        info!(
            prompt = %request.prompt,
            size = %request.size,
            aspect_ratio = %request.aspect_ratio,
            inputs = request.image_urls.len(),
            "Example provider received request"
        );

        let response = self
            .client
            .head(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => ProviderOutcome::Success(vec![url]),
            Ok(resp) => {
                warn!(status = resp.status().as_u16(), "Placeholder image unavailable");
                ProviderOutcome::failure(format!("placeholder returned HTTP {}", resp.status()))
            }
            Err(e) => ProviderOutcome::failure(format!("placeholder check failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions() {
        assert_eq!(dimensions("2K", "auto"), (1920, 1080));
        assert_eq!(dimensions("4K", "16:9"), (3840, 2160));
        assert_eq!(dimensions("4K", "1:1"), (3840, 3840));
    }

    #[test]
    fn test_placeholder_url_is_stable_per_prompt() {
        let provider = ExampleProvider::with_base_url("http://placeholder.test/");
        let request = GenerationRequest::new("a lighthouse").with_aspect_ratio("1:1");
        let first = provider.placeholder_url(&request);
        let second = provider.placeholder_url(&request);

        assert_eq!(first, second);
        assert!(first.starts_with("http://placeholder.test/1920/1920?w=1920&h=1920&random="));
    }
}
