//! Virtual-environment sandbox implementation.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{Error, Result};
use crate::store::absolute_path;

use super::provider::{Sandbox, SandboxProvider, VenvLayout};

/// A sandbox implemented as a Python virtual environment.
///
/// The venv lives in a hidden directory of the repository being healed, so
/// installed packages never touch the host interpreter.
pub struct VenvSandboxInstance {
    /// Root of the virtual environment.
    path: PathBuf,
    /// Executable layout inside the venv.
    layout: VenvLayout,
    /// Whether the sandbox has been cleaned up.
    cleaned_up: bool,
}

impl VenvSandboxInstance {
    fn new(path: PathBuf, layout: VenvLayout) -> Self {
        Self {
            path,
            layout,
            cleaned_up: false,
        }
    }
}

impl Sandbox for VenvSandboxInstance {
    fn path(&self) -> &Path {
        &self.path
    }

    fn interpreter_path(&self) -> PathBuf {
        self.layout.interpreter(&self.path)
    }

    fn installer_path(&self) -> PathBuf {
        self.layout.installer(&self.path)
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;

        if !self.path.exists() {
            return;
        }

        tracing::info!(path = ?self.path, "removing virtual environment");
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            let err = Error::SandboxCleanup {
                path: self.path.clone(),
                reason: e.to_string(),
            };
            tracing::warn!(error = %err, "could not remove sandbox directory");
        }
    }
}

impl Drop for VenvSandboxInstance {
    fn drop(&mut self) {
        if !self.cleaned_up {
            tracing::debug!(path = ?self.path, "cleaning up sandbox on drop");
            self.cleanup();
        }
    }
}

/// Provider that creates sandboxes using `python -m venv`.
#[derive(Clone)]
pub struct VenvSandbox {
    /// Path to the repository being healed.
    repo_path: PathBuf,
    /// Venv directory name, relative to the repository root.
    dir_name: String,
    /// Host interpreter used to build the venv.
    python: String,
    /// Executable layout of created venvs.
    layout: VenvLayout,
}

impl VenvSandbox {
    /// Creates a new venv sandbox provider.
    ///
    /// The venv is created at `repo_path/dir_name` by running
    /// `python -m venv`.
    pub fn new(
        repo_path: PathBuf,
        dir_name: impl Into<String>,
        python: impl Into<String>,
    ) -> Self {
        Self {
            repo_path: absolute_path(&repo_path),
            dir_name: dir_name.into(),
            python: python.into(),
            layout: VenvLayout::for_host(),
        }
    }

    /// Returns where the venv is created.
    pub fn venv_path(&self) -> PathBuf {
        self.repo_path.join(&self.dir_name)
    }

    fn remove_partial(path: &Path) {
        if path.exists() {
            if let Err(e) = std::fs::remove_dir_all(path) {
                tracing::warn!(error = %e, path = ?path, "failed to remove partial sandbox");
            }
        }
    }
}

impl SandboxProvider for VenvSandbox {
    type Sandbox = VenvSandboxInstance;

    fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    fn create(&self) -> Result<Self::Sandbox> {
        if !self.repo_path.is_dir() {
            return Err(Error::SandboxCreation(format!(
                "repository path {} is not a directory",
                self.repo_path.display()
            )));
        }

        let venv_path = self.venv_path();

        // A stale venv from an aborted run would shadow the fresh one.
        if venv_path.exists() {
            tracing::info!(path = ?venv_path, "removing existing sandbox");
            std::fs::remove_dir_all(&venv_path).map_err(|e| {
                Error::SandboxCreation(format!(
                    "could not remove existing sandbox at {}: {}",
                    venv_path.display(),
                    e
                ))
            })?;
        }

        tracing::info!(path = ?venv_path, python = %self.python, "creating virtual environment");

        let output = Command::new(&self.python)
            .current_dir(&self.repo_path)
            .args(["-m", "venv"])
            .arg(&venv_path)
            .output();

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                Self::remove_partial(&venv_path);
                return Err(Error::SandboxCreation(format!(
                    "failed to launch {}: {}",
                    self.python, e
                )));
            }
        };

        if !output.status.success() {
            Self::remove_partial(&venv_path);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::SandboxCreation(format!(
                "{} -m venv failed: {}",
                self.python,
                stderr.trim()
            )));
        }

        Ok(VenvSandboxInstance::new(venv_path, self.layout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn instance_at(path: PathBuf) -> VenvSandboxInstance {
        VenvSandboxInstance::new(path, VenvLayout::Posix)
    }

    #[test]
    fn venv_path_is_inside_repo() {
        let repo = TempDir::new().unwrap();
        let provider = VenvSandbox::new(repo.path().to_path_buf(), ".codehealer_venv", "python3");

        assert_eq!(provider.venv_path(), repo.path().join(".codehealer_venv"));
        assert_eq!(provider.repo_path(), repo.path());
    }

    #[test]
    fn instance_derives_executables_from_layout() {
        let sandbox = instance_at(PathBuf::from("/repo/.venv"));

        assert_eq!(sandbox.interpreter_path(), PathBuf::from("/repo/.venv/bin/python"));
        assert_eq!(sandbox.installer_path(), PathBuf::from("/repo/.venv/bin/pip"));
    }

    #[test]
    fn cleanup_removes_directory() {
        let repo = TempDir::new().unwrap();
        let venv = repo.path().join(".venv");
        std::fs::create_dir_all(venv.join("bin")).unwrap();
        std::fs::write(venv.join("bin").join("python"), "").unwrap();

        let mut sandbox = instance_at(venv.clone());
        sandbox.cleanup();

        assert!(!venv.exists());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let repo = TempDir::new().unwrap();
        let venv = repo.path().join(".venv");
        std::fs::create_dir_all(&venv).unwrap();

        let mut sandbox = instance_at(venv.clone());
        sandbox.cleanup();
        sandbox.cleanup();

        assert!(!venv.exists());
    }

    #[test]
    fn cleanup_of_missing_directory_is_noop() {
        let repo = TempDir::new().unwrap();
        let mut sandbox = instance_at(repo.path().join("never-created"));

        sandbox.cleanup();
    }

    #[test]
    fn drop_cleans_up() {
        let repo = TempDir::new().unwrap();
        let venv = repo.path().join(".venv");
        std::fs::create_dir_all(&venv).unwrap();

        {
            let _sandbox = instance_at(venv.clone());
        }

        assert!(!venv.exists());
    }

    #[test]
    fn create_fails_when_python_is_missing() {
        let repo = TempDir::new().unwrap();
        let stale = repo.path().join(".codehealer_venv");
        std::fs::create_dir_all(&stale).unwrap();

        let provider = VenvSandbox::new(
            repo.path().to_path_buf(),
            ".codehealer_venv",
            "codehealer-no-such-python",
        );

        let err = provider.create().err().expect("create should fail");
        assert!(matches!(err, Error::SandboxCreation(_)));
        // The stale venv is gone and nothing partial remains.
        assert!(!stale.exists());
    }

    #[test]
    fn create_fails_for_missing_repo() {
        let repo = TempDir::new().unwrap();
        let provider = VenvSandbox::new(repo.path().join("missing"), ".venv", "python3");

        assert!(matches!(provider.create(), Err(Error::SandboxCreation(_))));
    }

    #[test]
    #[ignore] // Requires python3 with the venv module
    fn create_builds_a_working_venv() {
        let repo = TempDir::new().unwrap();
        let provider = VenvSandbox::new(repo.path().to_path_buf(), ".codehealer_venv", "python3");

        let mut sandbox = provider.create().expect("failed to create venv");
        assert!(sandbox.path().is_dir());
        assert!(sandbox.interpreter_path().exists());

        let path = sandbox.path().to_path_buf();
        sandbox.cleanup();
        assert!(!path.exists());
    }
}
