//! Provider trait and capability helpers

use async_trait::async_trait;
use pixforge_core::{Capability, Error, GenerationRequest, ProviderOutcome, Result};

/// Capabilities of a provider that only generates
pub const GENERATE_ONLY: &[Capability] = &[Capability::Generate];

/// Capabilities of a provider that also swaps faces
pub const GENERATE_AND_FACE_SWAP: &[Capability] = &[Capability::Generate, Capability::FaceSwap];

/// Trait for all image generation providers
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Get the provider name
    fn name(&self) -> &str;

    /// Capabilities this provider offers
    fn capabilities(&self) -> &[Capability] {
        GENERATE_ONLY
    }

    /// Check a single capability
    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    /// Generate images for the given request.
    ///
    /// Failures are reported through [`ProviderOutcome::Failure`]; an empty
    /// success list is treated by the dispatcher as no result.
    async fn generate(&self, request: &GenerationRequest) -> ProviderOutcome;

    /// Swap the face from `face_url` onto `source_url`, returning one URL
    async fn swap_face(&self, source_url: &str, face_url: &str) -> Result<String> {
        let _ = (source_url, face_url);
        Err(Error::unsupported(format!(
            "provider '{}' does not support face swap",
            self.name()
        )))
    }
}
