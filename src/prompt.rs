//! Prompt builders for the suggestion providers.
//!
//! Each builder produces the user message of a single backend exchange; the
//! matching system prompt is a constant next to it.

/// System prompt for manifest repair and synthesis.
pub const ENVIRONMENT_SYSTEM_PROMPT: &str = "\
You are an expert in Python dependency management. You repair or write \
`requirements.txt` files so that `pip install -r requirements.txt` succeeds.

Rules:
- Prefer unpinned package names. Remove version specifiers unless the error \
log shows a specific version is required.
- Never list modules from the Python standard library.
- Respond with ONLY the full content of the `requirements.txt` file. No \
explanations, no apologies, no markdown formatting.";

/// System prompt for runtime code repair.
pub const CODE_SYSTEM_PROMPT: &str = "\
You are an expert Python programmer. You fix runtime errors in a Python \
repository given the full traceback.

Identify every file that must change and return its COMPLETE corrected \
content, not just the changed lines. Use exactly this format for each file:

FILEPATH: path/relative/to/repository/root.py
```python
# full corrected file content
```
---END FILE---

Paths must be relative to the repository root. Do not include any other \
text.";

/// Builds the user prompt for the environment provider.
pub struct ManifestPromptBuilder {
    manifest_file: String,
    log: String,
    current: Option<String>,
    history: Vec<String>,
}

impl ManifestPromptBuilder {
    /// Creates a builder for the named manifest file.
    pub fn new(manifest_file: impl Into<String>) -> Self {
        Self {
            manifest_file: manifest_file.into(),
            log: String::new(),
            current: None,
            history: Vec::new(),
        }
    }

    /// Sets the installer log, or the repository sources when synthesizing.
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// Sets the current manifest text; `None` switches to synthesis mode.
    pub fn with_current(mut self, current: Option<String>) -> Self {
        self.current = current;
        self
    }

    /// Adds manifests that were already tried and failed.
    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    /// Builds the prompt.
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        match &self.current {
            Some(current) => {
                prompt.push_str("## Installation Failure\n\n");
                prompt.push_str(&format!(
                    "The command `pip install -r {}` failed with the following error:\n\n",
                    self.manifest_file
                ));
                prompt.push_str("--- PIP ERROR LOG ---\n");
                prompt.push_str(self.log.trim_end());
                prompt.push_str("\n--- END ERROR LOG ---\n\n");

                prompt.push_str(&format!("### Current {}\n\n", self.manifest_file));
                prompt.push_str(&format!("--- {} ---\n", self.manifest_file));
                prompt.push_str(current.trim_end());
                prompt.push_str(&format!("\n--- END {} ---\n\n", self.manifest_file));

                prompt.push_str(
                    "Provide the corrected content. Remove version pins unless the log \
                     demands a specific version.\n",
                );
            }
            None => {
                prompt.push_str("## Missing Manifest\n\n");
                prompt.push_str(&format!(
                    "The repository has no {}. Here is its complete source code:\n\n",
                    self.manifest_file
                ));
                prompt.push_str(self.log.trim_end());
                prompt.push_str("\n\n");
                prompt.push_str(&format!(
                    "Write a {} listing every third-party package imported above. \
                     Exclude standard-library modules and the repository's own modules.\n",
                    self.manifest_file
                ));
            }
        }

        push_history(
            &mut prompt,
            &self.history,
            "The following manifests were already tried and did NOT work. \
             Your answer must be different from each of them.",
        );

        prompt
    }
}

/// Builds the user prompt for the code provider.
pub struct CodeFixPromptBuilder {
    log: String,
    history: Vec<String>,
}

impl CodeFixPromptBuilder {
    /// Creates a builder for the given traceback or status message.
    pub fn new(log: impl Into<String>) -> Self {
        Self {
            log: log.into(),
            history: Vec::new(),
        }
    }

    /// Adds file contents already applied in earlier attempts.
    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }

    /// Builds the prompt.
    pub fn build(&self) -> String {
        let mut prompt = String::new();

        prompt.push_str("## Runtime Failure\n\n");
        prompt.push_str("The Python script failed with the following output:\n\n");
        prompt.push_str("--- TRACEBACK ---\n");
        prompt.push_str(self.log.trim_end());
        prompt.push_str("\n--- END TRACEBACK ---\n\n");
        prompt.push_str(
            "Identify the files that need to change and provide their complete corrected \
             content in the required format.\n",
        );

        push_history(
            &mut prompt,
            &self.history,
            "These fixes were already applied and the script still fails. \
             Do not repeat them.",
        );

        prompt
    }
}

fn push_history(prompt: &mut String, history: &[String], instruction: &str) {
    if history.is_empty() {
        return;
    }

    prompt.push_str("\n### Previous Attempts\n\n");
    prompt.push_str(instruction);
    prompt.push_str("\n\n");
    for (i, attempt) in history.iter().enumerate() {
        prompt.push_str(&format!("Attempt {}:\n```\n{}\n```\n\n", i + 1, attempt.trim_end()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_prompt_includes_log_and_manifest() {
        let prompt = ManifestPromptBuilder::new("requirements.txt")
            .with_log("ERROR: No matching distribution found for flask==0.1")
            .with_current(Some("flask==0.1\n".to_string()))
            .build();

        assert!(prompt.contains("pip install -r requirements.txt"));
        assert!(prompt.contains("No matching distribution found"));
        assert!(prompt.contains("--- requirements.txt ---\nflask==0.1\n--- END requirements.txt ---"));
        assert!(prompt.contains("Remove version pins"));
        assert!(!prompt.contains("Previous Attempts"));
    }

    #[test]
    fn manifest_prompt_without_current_asks_for_synthesis() {
        let prompt = ManifestPromptBuilder::new("requirements.txt")
            .with_log("--- FILE: main.py ---\nimport requests\n")
            .build();

        assert!(prompt.contains("Missing Manifest"));
        assert!(prompt.contains("import requests"));
        assert!(prompt.contains("Exclude standard-library modules"));
        assert!(!prompt.contains("PIP ERROR LOG"));
    }

    #[test]
    fn manifest_prompt_lists_history() {
        let prompt = ManifestPromptBuilder::new("requirements.txt")
            .with_log("error")
            .with_current(Some("flask==1.0".to_string()))
            .with_history(vec!["flask==0.9".to_string(), "flask==1.0".to_string()])
            .build();

        assert!(prompt.contains("Previous Attempts"));
        assert!(prompt.contains("must be different"));
        assert!(prompt.contains("Attempt 1:\n```\nflask==0.9\n```"));
        assert!(prompt.contains("Attempt 2:\n```\nflask==1.0\n```"));
    }

    #[test]
    fn code_prompt_includes_traceback() {
        let prompt = CodeFixPromptBuilder::new("Traceback (most recent call last):\nNameError: x")
            .build();

        assert!(prompt.contains("--- TRACEBACK ---\nTraceback (most recent call last):"));
        assert!(prompt.contains("NameError: x\n--- END TRACEBACK ---"));
        assert!(!prompt.contains("Previous Attempts"));
    }

    #[test]
    fn code_prompt_lists_applied_fixes() {
        let prompt = CodeFixPromptBuilder::new("boom")
            .with_history(vec!["print('first try')".to_string()])
            .build();

        assert!(prompt.contains("Do not repeat them"));
        assert!(prompt.contains("print('first try')"));
    }

    #[test]
    fn code_system_prompt_documents_format() {
        assert!(CODE_SYSTEM_PROMPT.contains("FILEPATH:"));
        assert!(CODE_SYSTEM_PROMPT.contains("---END FILE---"));
    }
}
