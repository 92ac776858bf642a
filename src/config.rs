//! Configuration for heal runs.
//!
//! Every field has a default, so an empty TOML file (or no file at all)
//! yields a usable configuration. Configuration is validated before a run
//! to catch errors early.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the text-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "gpt-4-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout() -> u64 {
    120
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl BackendConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(Error::MissingCredential(self.api_key_env.clone())),
        }
    }
}

/// Configuration for a heal run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealConfig {
    /// Iteration budget shared by the environment and runtime phases.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Wall-clock limit for a single command, in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Pause after applying a fix, in milliseconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Sandbox directory name, relative to the repository root.
    #[serde(default = "default_sandbox_dir")]
    pub sandbox_dir: String,
    /// Dependency manifest file name at the repository root.
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
    /// Entry point candidates, in priority order.
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,
    /// Host interpreter used to build the virtual environment.
    #[serde(default = "default_python")]
    pub python: String,
    /// Generate a manifest from the sources when none exists.
    #[serde(default)]
    pub synthesize_manifest: bool,
    /// Import packages and run the test suite after a successful heal.
    #[serde(default)]
    pub verify_after_heal: bool,
    /// Backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_command_timeout() -> u64 {
    180
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_sandbox_dir() -> String {
    ".codehealer_venv".to_string()
}

fn default_manifest_file() -> String {
    "requirements.txt".to_string()
}

fn default_entry_points() -> Vec<String> {
    vec![
        "main.py".to_string(),
        "app.py".to_string(),
        "run.py".to_string(),
    ]
}

fn default_python() -> String {
    if cfg!(windows) {
        "python".to_string()
    } else {
        "python3".to_string()
    }
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            command_timeout_secs: default_command_timeout(),
            retry_delay_ms: default_retry_delay(),
            sandbox_dir: default_sandbox_dir(),
            manifest_file: default_manifest_file(),
            entry_points: default_entry_points(),
            python: default_python(),
            synthesize_manifest: false,
            verify_after_heal: false,
            backend: BackendConfig::default(),
        }
    }
}

impl HealConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Sets the iteration budget.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the pause after applying a fix.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs();
        self
    }

    /// Returns the per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Returns the pause after applying a fix.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Validation result containing all found issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation errors (fatal).
    pub errors: Vec<String>,
    /// List of validation warnings (non-fatal).
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the result.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the result.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for validatable configuration types.
pub trait Validate {
    /// Validates the configuration and returns any issues found.
    fn validate(&self) -> ValidationResult;
}

/// Returns true if `name` is a single path component.
fn is_plain_file_name(name: &str) -> bool {
    let path = Path::new(name);
    !name.is_empty() && path.components().count() == 1 && path.file_name().is_some()
}

impl Validate for BackendConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.model.trim().is_empty() {
            result.add_error("backend.model cannot be empty");
        }

        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            result.add_error(format!(
                "backend.base_url '{}' must be an http(s) URL",
                self.base_url
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            result.add_warning(format!(
                "backend.temperature {} is outside the usual 0.0-2.0 range",
                self.temperature
            ));
        }

        if self.request_timeout_secs == 0 {
            result.add_error("backend.request_timeout_secs must be at least 1");
        }

        result
    }
}

impl Validate for HealConfig {
    fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.max_iterations == 0 {
            result.add_error("max_iterations must be at least 1");
        }

        if self.max_iterations > 50 {
            result.add_warning("max_iterations > 50 may lead to excessive backend calls");
        }

        if self.command_timeout_secs == 0 {
            result.add_error("command_timeout_secs must be at least 1");
        }

        if !is_plain_file_name(&self.sandbox_dir) {
            result.add_error(format!(
                "sandbox_dir '{}' must be a single directory name",
                self.sandbox_dir
            ));
        }

        if !is_plain_file_name(&self.manifest_file) {
            result.add_error(format!(
                "manifest_file '{}' must be a file name at the repository root",
                self.manifest_file
            ));
        }

        if self.entry_points.is_empty() {
            result.add_warning("no entry points configured - the runtime phase will be skipped");
        }

        for entry in &self.entry_points {
            if !is_plain_file_name(entry) {
                result.add_error(format!(
                    "entry point '{}' must be a file name at the repository root",
                    entry
                ));
            }
        }

        if self.python.trim().is_empty() {
            result.add_error("python cannot be empty");
        }

        result.merge(self.backend.validate());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn heal_config_has_sensible_defaults() {
        let config = HealConfig::default();

        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.command_timeout(), Duration::from_secs(180));
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
        assert_eq!(config.sandbox_dir, ".codehealer_venv");
        assert_eq!(config.manifest_file, "requirements.txt");
        assert_eq!(config.entry_points, vec!["main.py", "app.py", "run.py"]);
        assert!(!config.synthesize_manifest);
        assert!(!config.verify_after_heal);
        assert_eq!(config.backend.model, "gpt-4-turbo");
        assert_eq!(config.backend.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn default_config_is_valid() {
        let result = HealConfig::default().validate();
        assert!(result.is_valid(), "errors: {:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn heal_config_deserializes_partial_toml() {
        let toml = r#"
            max_iterations = 4
            entry_points = ["server.py"]
            verify_after_heal = true

            [backend]
            model = "gpt-4o-mini"
        "#;

        let config: HealConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.entry_points, vec!["server.py"]);
        assert!(config.verify_after_heal);
        assert_eq!(config.backend.model, "gpt-4o-mini");
        assert_eq!(config.backend.base_url, "https://api.openai.com/v1");
        assert_eq!(config.command_timeout_secs, 180);
    }

    #[test]
    fn heal_config_loads_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("healer.toml");
        std::fs::write(&path, "max_iterations = 3\nretry_delay_ms = 0\n").unwrap();

        let config = HealConfig::from_file(&path).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.retry_delay(), Duration::ZERO);
    }

    #[test]
    fn heal_config_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("healer.toml");
        std::fs::write(&path, "max_iterations = \"many\"\n").unwrap();

        let err = HealConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn zero_iterations_is_an_error() {
        let config = HealConfig::default().with_max_iterations(0);
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.into_result().is_err());
    }

    #[test]
    fn nested_paths_are_rejected() {
        let config = HealConfig {
            manifest_file: "deps/requirements.txt".to_string(),
            sandbox_dir: "../venv".to_string(),
            entry_points: vec!["src/main.py".to_string()],
            ..Default::default()
        };

        let result = config.validate();
        assert_eq!(result.errors.len(), 3);
    }

    #[test]
    fn large_budget_only_warns() {
        let config = HealConfig::default().with_max_iterations(100);
        let result = config.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn backend_rejects_non_http_url() {
        let backend = BackendConfig {
            base_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(!backend.validate().is_valid());
    }

    #[test]
    fn api_key_missing_is_reported() {
        let backend = BackendConfig {
            api_key_env: "CODEHEALER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..Default::default()
        };

        let err = backend.api_key().unwrap_err();
        assert!(matches!(err, Error::MissingCredential(name) if name == "CODEHEALER_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
