//! codehealer - self-healing loop for Python repositories
//!
//! This library provisions an isolated virtual environment inside a Python
//! repository, installs its dependencies and runs its entry point, asking a
//! chat-completion backend for fixes whenever a step fails.

pub mod config;
pub mod debug;
pub mod error;
pub mod healer;
pub mod prompt;
pub mod runner;
pub mod sandbox;
pub mod store;
pub mod suggest;
pub mod target;

pub use config::{BackendConfig, HealConfig, Validate, ValidationResult};
pub use error::{Error, Result};
pub use healer::{HealReport, Healer, Phase, RunState, StateUpdate};
pub use runner::{CommandResult, OutputLine, OutputSink, ProjectRunner, SandboxRunner, EXECUTION_FAILURE};
pub use sandbox::{Sandbox, SandboxProvider, VenvSandbox};
pub use store::{FileStore, WriteOutcome};
pub use suggest::{
    ChatBackend, CodeProvider, EnvironmentProvider, Fix, OpenAiBackend, SuggestionProvider,
    SuggestionRequest,
};
pub use target::{resolve_target, ResolvedTarget};
