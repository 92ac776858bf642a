//! The healing loop.
//!
//! A run creates a sandbox, then alternates between running a command and
//! applying suggested fixes until the project installs and runs, a provider
//! has nothing to offer, or the iteration budget is spent:
//!
//! ```text
//! Setup -> Environment -> Runtime -> Finish
//!              |  ^          |  ^
//!              v  |          v  |
//!             fix-and-retry  fix-and-retry      (any) -> Fail
//! ```
//!
//! The sandbox is removed when the run ends, and by its `Drop` impl if the
//! loop unwinds.

pub mod state;

pub use state::{HistoryUpdate, Phase, RunState, StateUpdate};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::HealConfig;
use crate::error::Result;
use crate::runner::{OutputSink, ProjectRunner, SandboxRunner, NO_MANIFEST_MESSAGE};
use crate::sandbox::{Sandbox, SandboxProvider};
use crate::store::{absolute_path, concatenate_sources, FileStore, WriteOutcome};
use crate::suggest::{ChatBackend, CodeProvider, EnvironmentProvider, Fix, SuggestionProvider, SuggestionRequest};

/// Log recorded when the runtime phase has nothing to run.
pub const NO_ENTRY_POINT_MESSAGE: &str = "No entry point found.";

/// Outcome of a heal run.
#[derive(Debug, Clone)]
pub struct HealReport {
    /// Whether the project installed and ran.
    pub success: bool,
    /// Terminal phase.
    pub phase: Phase,
    /// Iterations used.
    pub iterations: u32,
    /// Output of the last command.
    pub log: String,
    /// Files rewritten during the run, in order.
    pub applied: Vec<PathBuf>,
    /// Post-heal verification results.
    pub notes: Vec<String>,
}

/// Result of one transition.
struct Step {
    update: StateUpdate,
    /// Fixes were applied and the phase should be retried.
    retry: bool,
    written: Vec<PathBuf>,
}

impl Step {
    fn advance(update: StateUpdate) -> Self {
        Self {
            update,
            retry: false,
            written: Vec::new(),
        }
    }
}

/// Drives a project through the healing loop.
pub struct Healer<P: SandboxProvider> {
    provider: P,
    config: HealConfig,
    environment: Box<dyn SuggestionProvider>,
    code: Box<dyn SuggestionProvider>,
    store: FileStore,
    output: Option<OutputSink>,
}

impl<P: SandboxProvider> Healer<P> {
    /// Creates a healer with explicit suggestion providers.
    pub fn new(
        provider: P,
        config: HealConfig,
        environment: Box<dyn SuggestionProvider>,
        code: Box<dyn SuggestionProvider>,
    ) -> Self {
        let store = FileStore::new(provider.repo_path()).with_skipped_dir(config.sandbox_dir.clone());
        Self {
            provider,
            config,
            environment,
            code,
            store,
            output: None,
        }
    }

    /// Creates a healer whose providers share one chat backend.
    pub fn with_backend(provider: P, config: HealConfig, backend: Arc<dyn ChatBackend>) -> Self {
        let repo = absolute_path(provider.repo_path());
        let environment = EnvironmentProvider::new(backend.clone(), repo.join(&config.manifest_file));
        let code = CodeProvider::new(backend, repo);
        Self::new(provider, config, Box::new(environment), Box::new(code))
    }

    /// Streams command output to `sink`.
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &HealConfig {
        &self.config
    }

    /// Runs the loop using the sandbox's own interpreter and installer.
    pub async fn heal(&self) -> Result<HealReport> {
        let repo = absolute_path(self.provider.repo_path());
        let output = self.output.clone();
        let config = &self.config;

        self.heal_with_runner(move |sandbox| {
            let runner = SandboxRunner::for_sandbox(repo, sandbox, config);
            match output {
                Some(sink) => runner.with_output(sink),
                None => runner,
            }
        })
        .await
    }

    /// Runs the loop with a runner built from the created sandbox.
    ///
    /// Returns an error only if the sandbox cannot be created.
    pub async fn heal_with_runner<R, F>(&self, make_runner: F) -> Result<HealReport>
    where
        R: ProjectRunner,
        F: FnOnce(&P::Sandbox) -> R,
    {
        let mut state = RunState::new(self.config.max_iterations);
        tracing::info!(phase = %state.phase, repo = ?self.provider.repo_path(), "starting heal run");

        let mut sandbox = match self.provider.create() {
            Ok(sandbox) => sandbox,
            Err(e) => {
                tracing::error!(error = %e, "sandbox setup failed, aborting");
                return Err(e);
            }
        };
        tracing::info!(path = ?sandbox.path(), "sandbox ready");

        let runner = make_runner(&sandbox);
        self.transition(&mut state, StateUpdate::to(Phase::Environment).with_history(HistoryUpdate::Reset));

        let mut applied = Vec::new();
        self.drive(&runner, &mut state, &mut applied).await;

        let notes = if state.phase == Phase::Finish && self.config.verify_after_heal {
            self.verify(&runner).await
        } else {
            Vec::new()
        };

        drop(runner);
        sandbox.cleanup();

        let success = state.phase == Phase::Finish;
        if success {
            tracing::info!(iterations = state.iteration, "healing succeeded");
        } else {
            tracing::warn!(iterations = state.iteration, "healing failed");
        }

        Ok(HealReport {
            success,
            phase: state.phase,
            iterations: state.iteration,
            log: state.log,
            applied,
            notes,
        })
    }

    async fn drive<R: ProjectRunner>(&self, runner: &R, state: &mut RunState, applied: &mut Vec<PathBuf>) {
        while !state.phase.is_terminal() {
            let step = match state.phase {
                Phase::Environment => self.environment_step(runner, state).await,
                Phase::Runtime => self.runtime_step(runner, state).await,
                _ => Step::advance(StateUpdate::fail()),
            };

            applied.extend(step.written);
            self.transition(state, step.update);

            if step.retry && !state.phase.is_terminal() {
                tokio::time::sleep(self.config.retry_delay()).await;
            }
        }
    }

    fn transition(&self, state: &mut RunState, update: StateUpdate) {
        let from = state.phase;
        state.apply(update);
        if state.phase != from {
            tracing::info!(from = %from, to = %state.phase, iteration = state.iteration, "phase transition");
        }
    }

    async fn environment_step<R: ProjectRunner>(&self, runner: &R, state: &RunState) -> Step {
        let Some(manifest) = runner.locate_manifest() else {
            if self.config.synthesize_manifest {
                return self.synthesize_step(state).await;
            }
            tracing::info!("no manifest found, skipping dependency installation");
            return Step::advance(
                StateUpdate::to(Phase::Runtime)
                    .with_log(NO_MANIFEST_MESSAGE)
                    .with_success(true)
                    .with_history(HistoryUpdate::Reset),
            );
        };

        let iteration = state.iteration + 1;
        tracing::info!(iteration, max_iterations = state.max_iterations, manifest = ?manifest, "installing dependencies");

        let result = runner.install_dependencies().await;
        if result.success() {
            tracing::info!(iteration, "dependencies installed");
            return Step::advance(
                StateUpdate::to(Phase::Runtime)
                    .with_iteration(iteration)
                    .with_log(result.output)
                    .with_success(true)
                    .with_history(HistoryUpdate::Reset),
            );
        }

        tracing::warn!(iteration, exit_code = result.exit_code, "dependency installation failed");
        let failed = StateUpdate::default()
            .with_iteration(iteration)
            .with_log(result.output.clone())
            .with_success(false);

        if iteration >= state.max_iterations {
            tracing::warn!(iteration, "iteration budget exhausted");
            return Step::advance(give_up(failed));
        }

        let current = self.store.read(&manifest).unwrap_or_default();
        let request = SuggestionRequest::new(result.output)
            .with_current(Some(current))
            .with_history(state.history.clone());

        tracing::info!(provider = self.environment.name(), "requesting manifest fix");
        let fixes = self.environment.suggest(&request).await;
        self.apply_fixes(fixes, failed)
    }

    async fn synthesize_step(&self, state: &RunState) -> Step {
        if state.budget_exhausted() {
            tracing::warn!(iteration = state.iteration, "iteration budget exhausted");
            return Step::advance(StateUpdate::fail());
        }

        let sources = self.store.list_source_files(self.store.root());
        if sources.is_empty() {
            tracing::info!("no manifest and no sources, skipping dependency installation");
            return Step::advance(
                StateUpdate::to(Phase::Runtime)
                    .with_log(NO_MANIFEST_MESSAGE)
                    .with_success(true)
                    .with_history(HistoryUpdate::Reset),
            );
        }

        let iteration = state.iteration + 1;
        tracing::info!(iteration, files = sources.len(), "no manifest found, synthesizing one from sources");

        let request = SuggestionRequest::new(concatenate_sources(&sources))
            .with_history(state.history.clone());
        let fixes = self.environment.suggest(&request).await;

        let base = StateUpdate::default()
            .with_iteration(iteration)
            .with_log(NO_MANIFEST_MESSAGE);
        self.apply_fixes(fixes, base)
    }

    async fn runtime_step<R: ProjectRunner>(&self, runner: &R, state: &RunState) -> Step {
        let Some(entry_point) = runner.locate_entry_point() else {
            tracing::info!("no entry point found, nothing to run");
            return Step::advance(
                StateUpdate::to(Phase::Finish)
                    .with_log(NO_ENTRY_POINT_MESSAGE)
                    .with_success(true),
            );
        };

        let iteration = state.iteration + 1;
        tracing::info!(iteration, max_iterations = state.max_iterations, entry_point = %entry_point, "running entry point");

        let result = runner.run_entry_point(&entry_point).await;
        if result.success() {
            tracing::info!(iteration, entry_point = %entry_point, "entry point ran successfully");
            return Step::advance(
                StateUpdate::to(Phase::Finish)
                    .with_iteration(iteration)
                    .with_log(result.output)
                    .with_success(true),
            );
        }

        tracing::warn!(iteration, exit_code = result.exit_code, entry_point = %entry_point, "entry point failed");
        let failed = StateUpdate::default()
            .with_iteration(iteration)
            .with_log(result.output.clone())
            .with_success(false);

        if iteration >= state.max_iterations {
            tracing::warn!(iteration, "iteration budget exhausted");
            return Step::advance(give_up(failed));
        }

        let request = SuggestionRequest::new(result.output).with_history(state.history.clone());

        tracing::info!(provider = self.code.name(), "requesting code fix");
        let fixes = self.code.suggest(&request).await;
        self.apply_fixes(fixes, failed)
    }

    /// Writes every fix and records it in history.
    ///
    /// Fails the run when there is nothing to apply or every write failed.
    fn apply_fixes(&self, fixes: Vec<Fix>, base: StateUpdate) -> Step {
        if fixes.is_empty() {
            tracing::warn!("no suggestion available, giving up");
            return Step::advance(give_up(base));
        }

        let mut written = Vec::new();
        let mut landed = 0;
        let mut history = Vec::with_capacity(fixes.len());
        for fix in fixes {
            tracing::info!(path = ?fix.path, "applying fix");
            match self.store.write(&fix.path, &fix.content) {
                WriteOutcome::Written => {
                    landed += 1;
                    written.push(fix.path);
                }
                WriteOutcome::Unchanged => landed += 1,
                WriteOutcome::Failed => {}
            }
            history.push(fix.content);
        }

        if landed == 0 {
            tracing::warn!("no fix could be written, giving up");
            return Step::advance(give_up(base.with_history(HistoryUpdate::Append(history))));
        }

        Step {
            update: base.with_history(HistoryUpdate::Append(history)),
            retry: true,
            written,
        }
    }

    /// Imports every package and runs the test suite; never changes the outcome.
    async fn verify<R: ProjectRunner>(&self, runner: &R) -> Vec<String> {
        tracing::info!("verifying healed project");
        let mut notes = Vec::new();

        for package in runner.discover_packages() {
            let result = runner.import_package(&package).await;
            if result.success() {
                tracing::info!(package = %package, "package imports cleanly");
                notes.push(format!("import {}: ok", package));
            } else {
                tracing::warn!(package = %package, exit_code = result.exit_code, "package import failed");
                notes.push(format!("import {}: failed (exit {})", package, result.exit_code));
            }
        }

        if runner.has_test_runner().await {
            let result = runner.run_tests().await;
            if result.success() {
                tracing::info!("test suite passed");
                notes.push("tests: passed".to_string());
            } else {
                tracing::warn!(exit_code = result.exit_code, "test suite failed");
                notes.push(format!("tests: failed (exit {})", result.exit_code));
            }
        } else {
            tracing::info!("pytest not available, skipping tests");
            notes.push("tests: skipped (pytest not available)".to_string());
        }

        notes
    }
}

fn give_up(update: StateUpdate) -> StateUpdate {
    StateUpdate {
        phase: Some(Phase::Fail),
        success: Some(false),
        ..update
    }
}
