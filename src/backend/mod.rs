//! Package-manager backends.
//!
//! Three interchangeable conda-family tools, ordered from most
//! full-featured to most portable: conda, mamba, micromamba. Micromamba is
//! the only one that can be bootstrapped onto a bare host (single static
//! binary, no Python prerequisite), which is why the resolver treats it as
//! the fallback of last resort.
//!
//! # Modules
//!
//! - [`resolver`] - Probe-in-order discovery and bootstrap fallback
//! - [`bootstrap`] - Micromamba download and scratch install

pub mod bootstrap;
pub mod resolver;
mod tools;

pub use tools::{CondaBackend, MambaBackend, MicromambaBackend};

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;
use crate::manifest::PackageManifest;
use crate::profile::ExecutionContext;
use crate::shell::CommandResult;

/// One installed package, as reported by `<tool> list --json`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Capability interface over a conda-family package manager.
///
/// Exactly one backend is selected per run and lives for the process
/// lifetime. Implementations never mutate an existing installation; the
/// only filesystem effects go through the target prefix and the tool's
/// own cache.
pub trait Backend {
    /// Tool name as it appears on PATH.
    fn name(&self) -> &'static str;

    /// Resolved binary path.
    fn binary(&self) -> &Path;

    /// Create an environment at `prefix` from the full manifest in a
    /// single solver transaction.
    fn create_environment(
        &self,
        manifest: &PackageManifest,
        prefix: &Path,
        ctx: &ExecutionContext,
    ) -> Result<CommandResult>;

    /// Run a command inside the environment at `prefix`.
    fn run_in_environment(
        &self,
        prefix: &Path,
        command: &[&str],
        ctx: &ExecutionContext,
    ) -> Result<CommandResult>;

    /// List packages installed in the environment at `prefix`.
    fn list_installed(&self, prefix: &Path, ctx: &ExecutionContext)
        -> Result<Vec<InstalledPackage>>;

    /// Remove the tool's package caches. Best-effort.
    fn clean_cache(&self, ctx: &ExecutionContext) -> Result<CommandResult>;
}

/// Argument vector for a `create` invocation, shared by all three tools.
pub(crate) fn create_args(manifest: &PackageManifest, prefix: &Path) -> Vec<String> {
    let mut args = vec![
        "create".to_string(),
        "-y".to_string(),
        "-p".to_string(),
        prefix.display().to_string(),
    ];
    for channel in &manifest.channels {
        args.push("-c".to_string());
        args.push(channel.clone());
    }
    args.extend(manifest.render_packages());
    args
}

/// Argument vector for a `run` invocation.
pub(crate) fn run_args(prefix: &Path, command: &[&str]) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-p".to_string(),
        prefix.display().to_string(),
    ];
    args.extend(command.iter().map(|s| s.to_string()));
    args
}

pub(crate) fn list_args(prefix: &Path) -> Vec<String> {
    vec![
        "list".to_string(),
        "-p".to_string(),
        prefix.display().to_string(),
        "--json".to_string(),
    ]
}

pub(crate) fn clean_args() -> Vec<String> {
    vec!["clean".to_string(), "-a".to_string(), "-y".to_string()]
}

/// Preference order for auto-discovery.
pub(crate) const PROBE_ORDER: &[&str] = &["conda", "mamba", "micromamba"];

/// Construct the backend for a tool name found at `binary`.
pub(crate) fn backend_for(name: &str, binary: PathBuf) -> Box<dyn Backend> {
    match name {
        "conda" => Box::new(CondaBackend::new(binary)),
        "mamba" => Box::new(MambaBackend::new(binary)),
        _ => Box::new(MicromambaBackend::new(binary)),
    }
}
