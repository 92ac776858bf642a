//! Error types for the healing loop.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for heal operations.
///
/// Only setup-level problems surface as errors. Command failures, backend
/// failures and file I/O problems inside the loop are recoverable and are
/// reported through return values instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to create the sandbox.
    #[error("failed to create sandbox: {0}")]
    SandboxCreation(String),

    /// Failed to clean up the sandbox.
    #[error("failed to clean up sandbox at {path}: {reason}")]
    SandboxCleanup { path: PathBuf, reason: String },

    /// IO error outside the healing loop.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The target path is not a directory or supported archive.
    #[error("invalid target path: {0}")]
    InvalidPath(PathBuf),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The text-generation backend failed.
    #[error("backend request failed: {0}")]
    Backend(String),

    /// A required credential is missing from the environment.
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// Archive extraction failed.
    #[error("failed to extract archive {path}: {reason}")]
    Archive { path: PathBuf, reason: String },
}

/// Result type alias for heal operations.
pub type Result<T> = std::result::Result<T, Error>;
