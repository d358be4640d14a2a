use clap::Parser;
use std::path::PathBuf;

/// Command line and environment surface.
///
/// Every optional value overrides the matching key of the YAML config file
/// when present.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pixforge-server")]
#[command(author, version, about = "PixForge image generation backend", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "PIXFORGE_CONFIG", default_value = "pixforge.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, env = "PIXFORGE_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "PORT")]
    pub port: Option<u16>,

    /// Directory served for unmatched routes
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Directory scanned for plugin manifests
    #[arg(long, env = "PLUGIN_DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Comma-separated plugin allow-list; empty loads everything but `example`
    #[arg(long, env = "PLUGIN_ENABLED")]
    pub plugin_enabled: Option<String>,

    /// Plugin used for face swapping
    #[arg(long, env = "FACE_SWAP_PLUGIN")]
    pub face_swap_plugin: Option<String>,

    /// Comma-separated default provider order
    #[arg(long, env = "FALLBACK_ORDER")]
    pub fallback_order: Option<String>,

    /// Upload backend: imgbb or github_jsdelivr
    #[arg(long, env = "UPLOAD_BACKEND")]
    pub upload_backend: Option<String>,

    #[arg(long, env = "IMGBB_API_KEY", hide_env_values = true)]
    pub imgbb_api_key: Option<String>,

    #[arg(long, env = "GITHUB_USERNAME")]
    pub github_username: Option<String>,

    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: Option<String>,

    #[arg(long, env = "GITHUB_BRANCH")]
    pub github_branch: Option<String>,

    /// Local working copy of the CDN repository
    #[arg(long, env = "LOCAL_REPO_PATH")]
    pub local_repo_path: Option<PathBuf>,

    #[arg(long, env = "HISTORY_DIR")]
    pub history_dir: Option<PathBuf>,

    #[arg(long, env = "STORYBOARD_DIR")]
    pub storyboard_dir: Option<PathBuf>,

    /// Shared secret expected in the `x-api-key` header
    #[arg(long, env = "SESSION_KEY", hide_env_values = true)]
    pub session_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
