//! Command runner for executing project commands inside a sandbox.
//!
//! [`ProjectRunner`] is the seam the healer drives; [`SandboxRunner`] is the
//! implementation that runs the sandbox's interpreter and installer against
//! the repository.

pub mod process;

pub use process::{execute, CommandResult, OutputLine, OutputSink, EXECUTION_FAILURE};

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::HealConfig;
use crate::sandbox::Sandbox;
use crate::store::absolute_path;

/// Message returned by [`ProjectRunner::install_dependencies`] without a manifest.
pub const NO_MANIFEST_MESSAGE: &str = "No manifest found.";

/// Marker file identifying an importable package directory.
const PACKAGE_MARKER: &str = "__init__.py";

/// Operations the healer needs from a project.
#[async_trait]
pub trait ProjectRunner: Send + Sync {
    /// Returns the dependency manifest path if it exists.
    fn locate_manifest(&self) -> Option<PathBuf>;

    /// Installs the manifest into the sandbox.
    ///
    /// Returns `(0, "No manifest found.")` without launching anything when
    /// there is no manifest.
    async fn install_dependencies(&self) -> CommandResult;

    /// Returns the first existing entry point candidate.
    fn locate_entry_point(&self) -> Option<String>;

    /// Runs the named entry point with the sandbox interpreter.
    async fn run_entry_point(&self, name: &str) -> CommandResult;

    /// Returns the sorted top-level importable packages.
    fn discover_packages(&self) -> Vec<String> {
        Vec::new()
    }

    /// Attempts to import a package inside the sandbox.
    async fn import_package(&self, name: &str) -> CommandResult {
        CommandResult::execution_failure(format!("cannot import {}: unsupported runner", name))
    }

    /// Returns true if a test runner is available in the sandbox.
    async fn has_test_runner(&self) -> bool {
        false
    }

    /// Runs the test suite.
    async fn run_tests(&self) -> CommandResult {
        CommandResult::execution_failure("cannot run tests: unsupported runner")
    }
}

/// Runs project commands with a sandbox's interpreter and installer.
pub struct SandboxRunner {
    /// Repository root; also the working directory of every command.
    repo_path: PathBuf,
    /// Interpreter inside the sandbox.
    interpreter: PathBuf,
    /// Package installer inside the sandbox.
    installer: PathBuf,
    /// Manifest file name at the repository root.
    manifest_file: String,
    /// Entry point candidates, in priority order.
    entry_points: Vec<String>,
    /// Per-command wall-clock limit.
    timeout: Duration,
    /// Live output receiver.
    sink: Option<OutputSink>,
}

impl SandboxRunner {
    /// Creates a runner with explicit executables.
    pub fn new(
        repo_path: PathBuf,
        interpreter: PathBuf,
        installer: PathBuf,
        config: &HealConfig,
    ) -> Self {
        Self {
            repo_path: absolute_path(&repo_path),
            interpreter,
            installer,
            manifest_file: config.manifest_file.clone(),
            entry_points: config.entry_points.clone(),
            timeout: config.command_timeout(),
            sink: None,
        }
    }

    /// Creates a runner using a sandbox's executables.
    pub fn for_sandbox(repo_path: PathBuf, sandbox: &dyn Sandbox, config: &HealConfig) -> Self {
        Self::new(
            repo_path,
            sandbox.interpreter_path(),
            sandbox.installer_path(),
            config,
        )
    }

    /// Streams command output to `sink` as it is produced.
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Overrides the per-command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the repository root.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Runs a command in the repository root.
    pub async fn execute(&self, argv: Vec<String>) -> CommandResult {
        execute(&argv, &self.repo_path, self.timeout, self.sink.as_ref()).await
    }

    fn interpreter_command(&self, args: &[&str]) -> Vec<String> {
        let mut argv = vec![self.interpreter.to_string_lossy().into_owned()];
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }
}

#[async_trait]
impl ProjectRunner for SandboxRunner {
    fn locate_manifest(&self) -> Option<PathBuf> {
        let path = self.repo_path.join(&self.manifest_file);
        path.is_file().then_some(path)
    }

    async fn install_dependencies(&self) -> CommandResult {
        let Some(manifest) = self.locate_manifest() else {
            return CommandResult::new(0, NO_MANIFEST_MESSAGE);
        };

        tracing::info!(manifest = ?manifest, "installing dependencies");
        self.execute(vec![
            self.installer.to_string_lossy().into_owned(),
            "install".to_string(),
            "-r".to_string(),
            manifest.to_string_lossy().into_owned(),
        ])
        .await
    }

    fn locate_entry_point(&self) -> Option<String> {
        self.entry_points
            .iter()
            .find(|name| self.repo_path.join(name).is_file())
            .cloned()
    }

    async fn run_entry_point(&self, name: &str) -> CommandResult {
        tracing::info!(entry_point = %name, "running entry point");
        self.execute(self.interpreter_command(&[name])).await
    }

    fn discover_packages(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.repo_path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, path = ?self.repo_path, "failed to list repository");
                return Vec::new();
            }
        };

        let mut packages: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(PACKAGE_MARKER).is_file())
            .filter_map(|path| path.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        packages.sort();
        packages
    }

    async fn import_package(&self, name: &str) -> CommandResult {
        let statement = format!("import {}", name);
        self.execute(self.interpreter_command(&["-c", &statement]))
            .await
    }

    async fn has_test_runner(&self) -> bool {
        self.execute(self.interpreter_command(&["-c", "import pytest"]))
            .await
            .success()
    }

    async fn run_tests(&self) -> CommandResult {
        self.execute(self.interpreter_command(&["-m", "pytest"]))
            .await
    }
}
