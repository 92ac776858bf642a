//! Multi-file source code provider.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use path_clean::PathClean;
use regex::Regex;

use crate::prompt::{CodeFixPromptBuilder, CODE_SYSTEM_PROMPT};
use crate::store::absolute_path;

use super::{ask, ChatBackend, Fix, SuggestionProvider, SuggestionRequest};

/// Line separating file blocks in a reply.
pub const FILE_DELIMITER: &str = "---END FILE---";

const PATH_PATTERN: &str = r"FILEPATH:[ \t]*(\S[^\r\n]*)";
const FENCE_PATTERN: &str = r"(?s)```[A-Za-z0-9_+.-]*[ \t]*\r?\n(.*?)```";

/// Repairs source files from a runtime traceback.
pub struct CodeProvider {
    backend: Arc<dyn ChatBackend>,
    repo_root: PathBuf,
}

impl CodeProvider {
    /// Creates a provider whose fixes are confined to `repo_root`.
    pub fn new(backend: Arc<dyn ChatBackend>, repo_root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            repo_root: absolute_path(&repo_root.into()),
        }
    }
}

#[async_trait]
impl SuggestionProvider for CodeProvider {
    async fn suggest(&self, request: &SuggestionRequest) -> Vec<Fix> {
        let prompt = CodeFixPromptBuilder::new(request.log.clone())
            .with_history(request.history.clone())
            .build();

        let reply = ask(self.backend.as_ref(), self.name(), CODE_SYSTEM_PROMPT, &prompt).await;
        let fixes = parse_code_response(&reply, &self.repo_root);

        if fixes.is_empty() {
            tracing::info!("code provider returned no usable fix");
        }
        fixes
    }

    fn name(&self) -> &str {
        "code"
    }
}

/// Extracts file replacements from a reply.
///
/// The reply is split on [`FILE_DELIMITER`]. Each block must carry a
/// `FILEPATH:` line and a fenced body; blocks missing either are skipped.
/// Paths are resolved against `root` (made absolute first) and lexically
/// normalized, and any
/// block whose path leaves `root` is dropped without affecting the rest.
pub fn parse_code_response(reply: &str, root: &Path) -> Vec<Fix> {
    let (Ok(path_re), Ok(fence_re)) = (Regex::new(PATH_PATTERN), Regex::new(FENCE_PATTERN)) else {
        tracing::error!("invalid response pattern");
        return Vec::new();
    };

    let root = absolute_path(root);
    let mut fixes = Vec::new();

    for block in reply.split(FILE_DELIMITER) {
        let Some(path) = path_re.captures(block).and_then(|c| c.get(1)) else {
            continue;
        };
        // Only look for the body after the path marker.
        let rest = &block[path.end()..];
        let Some(body) = fence_re.captures(rest).and_then(|c| c.get(1)) else {
            continue;
        };

        let relative = path.as_str().trim().trim_start_matches(|c: char| c == '/' || c == '\\');
        match resolve_inside(&root, relative) {
            Some(path) => fixes.push(Fix::new(path, body.as_str().trim())),
            None => {
                tracing::warn!(path = %relative, root = ?root, "suggested path is outside the repository, skipping");
            }
        }
    }

    fixes
}

/// Joins `relative` to `root`, returning `None` unless the normalized result
/// is a path strictly below `root`.
fn resolve_inside(root: &Path, relative: &str) -> Option<PathBuf> {
    if relative.is_empty() {
        return None;
    }
    let resolved = root.join(relative).clean();
    (resolved.starts_with(root) && resolved != root).then_some(resolved)
}
