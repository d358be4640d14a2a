//! PixForge Core
//!
//! Core types and error handling shared across PixForge components.
//!
//! This crate provides:
//! - The generation request and provider outcome types passed between the
//!   dispatcher and provider adapters
//! - The persisted history record shape
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Capability, GenerationRequest, HistoryRecord, ProviderOutcome};
