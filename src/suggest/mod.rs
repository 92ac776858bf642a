//! Suggestion providers.
//!
//! A [`SuggestionProvider`] turns failure context into zero or more
//! validated file replacements. The environment provider repairs the
//! dependency manifest; the code provider repairs source files.

pub mod backend;
mod code;
mod environment;

pub use backend::{ChatBackend, OpenAiBackend};
pub use code::{parse_code_response, CodeProvider, FILE_DELIMITER};
pub use environment::{parse_manifest_response, EnvironmentProvider};

use std::path::PathBuf;

use async_trait::async_trait;

/// A full-content replacement for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    /// Absolute path inside the repository root.
    pub path: PathBuf,
    /// New file content.
    pub content: String,
}

impl Fix {
    /// Creates a fix.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Context for a suggestion request.
#[derive(Debug, Clone, Default)]
pub struct SuggestionRequest {
    /// Error log, or repository sources when synthesizing a manifest.
    pub log: String,
    /// Current content of the file under repair, if any.
    pub current: Option<String>,
    /// Earlier attempts, oldest first.
    pub history: Vec<String>,
}

impl SuggestionRequest {
    /// Creates a request for the given log.
    pub fn new(log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            ..Self::default()
        }
    }

    /// Sets the current file content.
    pub fn with_current(mut self, current: Option<String>) -> Self {
        self.current = current;
        self
    }

    /// Sets the attempt history.
    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }
}

/// Produces file replacements from failure context.
///
/// Implementations never fail: backend and parse problems are logged and
/// reported as an empty list.
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    /// Returns the suggested fixes; empty means no suggestion.
    async fn suggest(&self, request: &SuggestionRequest) -> Vec<Fix>;

    /// Returns a short name for logging.
    fn name(&self) -> &str;
}

/// Asks the backend, mapping any failure to an empty reply.
pub(crate) async fn ask(backend: &dyn ChatBackend, provider: &str, system: &str, user: &str) -> String {
    match backend.complete(system, user).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(provider = %provider, model = %backend.model(), error = %e, "backend request failed");
            String::new()
        }
    }
}
