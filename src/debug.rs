//! Debug configuration for heal runs.
//!
//! Environment variables:
//! - `HEALER_DEBUG=1` - Enable verbose debug output
//!
//! When HEALER_DEBUG is enabled:
//! - Every command is printed with its full argument vector
//! - Backend requests print a preview of the prompt
//! - The CLI lowers the default log level to `debug`

use std::sync::OnceLock;

/// Global debug configuration loaded once at startup.
static DEBUG_CONFIG: OnceLock<DebugConfig> = OnceLock::new();

/// Number of prompt characters shown in debug output.
const PROMPT_PREVIEW_CHARS: usize = 200;

/// Debug configuration.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    /// Enable verbose debug output.
    pub debug_mode: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DebugConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            debug_mode: std::env::var("HEALER_DEBUG")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        }
    }
}

/// Gets the global debug configuration.
///
/// This is initialized once from environment variables.
pub fn get_config() -> &'static DebugConfig {
    DEBUG_CONFIG.get_or_init(DebugConfig::from_env)
}

/// Returns true if debug mode is enabled.
pub fn is_debug() -> bool {
    get_config().debug_mode
}

/// Prints debug info about a command before running it.
pub fn debug_command(argv: &[String], working_dir: &std::path::Path) {
    if is_debug() {
        eprintln!("[HEALER_DEBUG] Running command:");
        eprintln!("  argv: {:?}", argv);
        eprintln!("  cwd: {}", working_dir.display());
    }
}

/// Prints debug info about a backend request.
pub fn debug_backend_request(provider: &str, model: &str, prompt: &str) {
    if is_debug() {
        eprintln!("[HEALER_DEBUG] Backend request:");
        eprintln!("  provider: {}", provider);
        eprintln!("  model: {}", model);
        eprintln!("  prompt (first {} chars): {}...", PROMPT_PREVIEW_CHARS, preview(prompt));
    }
}

fn preview(text: &str) -> String {
    text.chars().take(PROMPT_PREVIEW_CHARS).collect()
}
