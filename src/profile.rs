//! Installation profile and execution context.
//!
//! The [`InstallationProfile`] captures everything a run needs, resolved
//! from CLI input once and immutable afterwards. The [`ExecutionContext`]
//! carries the ambient state a run accumulates (scratch directory,
//! PATH additions for a bootstrapped backend, extra env vars) so nothing
//! leaks into process-wide globals and runs stay testable in isolation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tempfile::TempDir;

use crate::error::{CraftenvError, Result};

/// Which package manager the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendRequest {
    /// Probe conda, mamba, micromamba in order; bootstrap micromamba as a
    /// last resort.
    #[default]
    Auto,
    Conda,
    Mamba,
    Micromamba,
}

/// How extracted parameter files are published into the environment.
///
/// Symlinking avoids duplicating a multi-gigabyte payload but assumes the
/// storage directory outlives the environment on the same filesystem;
/// containerized targets that get squashed into an image need real copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LinkMode {
    #[default]
    Symlink,
    Copy,
}

/// Policy for a requested CUDA version the channels do not carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CudaFallback {
    /// Substitute the nearest supported version and log the downgrade.
    #[default]
    Nearest,
    /// Defer to the backend solver with a `<major>.*` wildcard pin.
    Wildcard,
    /// Fail instead of installing anything other than the requested version.
    Strict,
}

/// A helper binary that must carry the executable bit after install.
#[derive(Debug, Clone)]
pub struct ExecutableFixup {
    /// Path relative to the working directory.
    pub path: PathBuf,
    /// Whether a missing binary or failed chmod aborts the run.
    pub required: bool,
}

/// Immutable description of one provisioning run.
#[derive(Debug, Clone)]
pub struct InstallationProfile {
    /// Requested package-manager backend.
    pub backend: BackendRequest,
    /// CUDA toolkit version for the GPU variant; `None` means CPU-only.
    pub cuda: Option<String>,
    /// Environment prefix directory.
    pub prefix: PathBuf,
    /// Storage directory for extracted model parameters.
    pub weights_dir: PathBuf,
    /// Parameter archive URL.
    pub weights_url: String,
    /// Skip the parameter bundle stage entirely.
    pub skip_weights: bool,
    /// Publish policy for parameter files.
    pub link_mode: LinkMode,
    /// Policy for unsupported CUDA versions.
    pub cuda_fallback: CudaFallback,
    /// `CONDA_OVERRIDE_CUDA` virtual-package override, exported to the
    /// backend during environment creation.
    pub cuda_override: Option<String>,
    /// Helper binaries to chmod at the end of a run.
    pub executables: Vec<ExecutableFixup>,
}

/// Default parameter archive: the 2022-12-06 AlphaFold2 release.
pub const DEFAULT_WEIGHTS_URL: &str =
    "https://storage.googleapis.com/alphafold/alphafold_params_2022-12-06.tar";

/// The file whose presence in the publish directory proves the parameter
/// bundle was provisioned. Reruns short-circuit on it.
pub const WEIGHTS_SENTINEL: &str = "params_model_5_ptm.npz";

fn cuda_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid regex"))
}

impl InstallationProfile {
    /// Validate cross-field invariants. Called once after parse, before
    /// any I/O happens.
    pub fn validate(&self, cpu_only: bool) -> Result<()> {
        if cpu_only && self.cuda.is_some() {
            return Err(CraftenvError::ManifestError {
                message: "--cpu and --cuda are mutually exclusive".into(),
            });
        }
        if let Some(version) = &self.cuda {
            if !cuda_version_re().is_match(version) {
                return Err(CraftenvError::ManifestError {
                    message: format!("invalid CUDA version '{version}', expected e.g. 11.8 or 12"),
                });
            }
        }
        if let Some(version) = &self.cuda_override {
            if !cuda_version_re().is_match(version) {
                return Err(CraftenvError::ManifestError {
                    message: format!("invalid CUDA override '{version}'"),
                });
            }
        }
        Ok(())
    }

    /// Whether this run installs the GPU variant.
    pub fn gpu(&self) -> bool {
        self.cuda.is_some()
    }

    /// Directory inside the environment where parameters are published.
    pub fn params_dir(&self) -> PathBuf {
        self.prefix.join("params")
    }

    /// Helper binaries the toolchain expects under `functions/`.
    ///
    /// Both are optional: the scripts they belong to degrade gracefully
    /// when they are absent, so a missing file is a warning only.
    pub fn default_executables() -> Vec<ExecutableFixup> {
        vec![
            ExecutableFixup {
                path: PathBuf::from("functions/dssp"),
                required: false,
            },
            ExecutableFixup {
                path: PathBuf::from("functions/DAlphaBall.gcc"),
                required: false,
            },
        ]
    }
}

/// Ambient per-run state.
///
/// Owns the scratch directory used for the bootstrap binary and the staged
/// parameter archive; dropping the context removes it.
#[derive(Debug)]
pub struct ExecutionContext {
    scratch: TempDir,
    /// Directories prepended to PATH for every backend invocation.
    pub path_prepend: Vec<PathBuf>,
    /// Extra environment variables for backend invocations.
    pub env: HashMap<String, String>,
}

impl ExecutionContext {
    /// Create a context with a fresh scratch directory.
    pub fn new() -> Result<Self> {
        let scratch = tempfile::Builder::new().prefix("craftenv-").tempdir()?;
        Ok(Self {
            scratch,
            path_prepend: Vec::new(),
            env: HashMap::new(),
        })
    }

    /// The scratch directory for this run.
    pub fn scratch_dir(&self) -> &std::path::Path {
        self.scratch.path()
    }

    /// Expose a directory of executables to subsequent backend invocations.
    pub fn prepend_path(&mut self, dir: PathBuf) {
        if !self.path_prepend.contains(&dir) {
            self.path_prepend.insert(0, dir);
        }
    }

    /// Shell options carrying this context's PATH and env.
    pub fn command_options(&self) -> crate::shell::CommandOptions {
        crate::shell::CommandOptions {
            cwd: None,
            env: self.env.clone(),
            path_prepend: self.path_prepend.clone(),
        }
    }
}
