//! PixForge Server
//!
//! HTTP backend around the provider dispatcher: uploads, generation with
//! single-slot admission, history, face swap and storyboards.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use app::build_app;
pub use cli::Cli;
pub use config::ServerConfig;
pub use routes::AppError;
pub use state::{AppState, GenerationSlot, GenerationTicket};
