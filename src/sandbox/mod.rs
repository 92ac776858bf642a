//! Sandbox module for isolated execution environments.
//!
//! This module provides the [`SandboxProvider`] trait for creating isolated
//! sandboxes and the [`VenvSandbox`] implementation using Python virtual
//! environments.

mod provider;
mod venv;

pub use provider::{Sandbox, SandboxProvider, VenvLayout};
pub use venv::{VenvSandbox, VenvSandboxInstance};
