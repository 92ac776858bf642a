//! Sandbox provider trait and types.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory layout of a virtual environment.
///
/// Windows puts executables under `Scripts/` with an `.exe` suffix; every
/// other platform uses `bin/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VenvLayout {
    Windows,
    Posix,
}

impl VenvLayout {
    /// Returns the layout used by the current host.
    pub fn for_host() -> Self {
        if cfg!(windows) {
            VenvLayout::Windows
        } else {
            VenvLayout::Posix
        }
    }

    /// Path to the interpreter inside a venv rooted at `root`.
    pub fn interpreter(&self, root: &Path) -> PathBuf {
        match self {
            VenvLayout::Windows => root.join("Scripts").join("python.exe"),
            VenvLayout::Posix => root.join("bin").join("python"),
        }
    }

    /// Path to the package installer inside a venv rooted at `root`.
    pub fn installer(&self, root: &Path) -> PathBuf {
        match self {
            VenvLayout::Windows => root.join("Scripts").join("pip.exe"),
            VenvLayout::Posix => root.join("bin").join("pip"),
        }
    }
}

/// Represents an active sandbox environment.
pub trait Sandbox: Send + Sync {
    /// Returns the root directory of the sandbox.
    fn path(&self) -> &Path;

    /// Returns the interpreter that runs code inside the sandbox.
    fn interpreter_path(&self) -> PathBuf;

    /// Returns the package installer of the sandbox.
    fn installer_path(&self) -> PathBuf;

    /// Removes the sandbox.
    ///
    /// Idempotent. Removal failures are logged, never returned.
    fn cleanup(&mut self);
}

/// Provider for creating sandboxed environments.
pub trait SandboxProvider: Send + Sync {
    /// The type of sandbox this provider creates.
    type Sandbox: Sandbox;

    /// Creates a fresh sandbox, replacing any existing one at the same location.
    fn create(&self) -> Result<Self::Sandbox>;

    /// Returns the path to the repository root.
    fn repo_path(&self) -> &Path;
}
