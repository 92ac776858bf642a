//! Dependency manifest provider.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::prompt::{ManifestPromptBuilder, ENVIRONMENT_SYSTEM_PROMPT};

use super::{ask, ChatBackend, Fix, SuggestionProvider, SuggestionRequest};

/// Repairs or synthesizes the dependency manifest.
///
/// With `current` set the request is a repair of that manifest; without it
/// the log is taken to be the repository sources and a fresh manifest is
/// synthesized from their imports.
pub struct EnvironmentProvider {
    backend: Arc<dyn ChatBackend>,
    manifest_path: PathBuf,
}

impl EnvironmentProvider {
    /// Creates a provider whose fixes target `manifest_path`.
    pub fn new(backend: Arc<dyn ChatBackend>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            manifest_path: manifest_path.into(),
        }
    }

    fn manifest_name(&self) -> String {
        self.manifest_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "requirements.txt".to_string())
    }
}

#[async_trait]
impl SuggestionProvider for EnvironmentProvider {
    async fn suggest(&self, request: &SuggestionRequest) -> Vec<Fix> {
        let prompt = ManifestPromptBuilder::new(self.manifest_name())
            .with_log(request.log.clone())
            .with_current(request.current.clone())
            .with_history(request.history.clone())
            .build();

        let reply = ask(self.backend.as_ref(), self.name(), ENVIRONMENT_SYSTEM_PROMPT, &prompt).await;

        match parse_manifest_response(&reply) {
            Some(content) => vec![Fix::new(self.manifest_path.clone(), content)],
            None => {
                tracing::info!("environment provider returned no usable manifest");
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        "environment"
    }
}

/// Extracts manifest text from a reply.
///
/// Trims whitespace and strips a surrounding markdown fence. Returns `None`
/// when nothing remains.
pub fn parse_manifest_response(reply: &str) -> Option<String> {
    let trimmed = reply.trim();

    let body = match trimmed.strip_prefix("```") {
        Some(rest) => {
            // Drop the info string (e.g. "text") on the opening fence line.
            let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
            rest.trim_end().strip_suffix("```").unwrap_or(rest)
        }
        None => trimmed,
    };

    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}
