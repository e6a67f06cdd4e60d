//! CLI argument definitions.
//!
//! All arguments are defined with clap's derive macros; [`Cli::into_profile`]
//! turns parsed input into a validated [`InstallationProfile`] before any
//! stage touches the filesystem or network.

use clap::Parser;
use std::path::PathBuf;

use crate::error::Result;
use crate::profile::{
    BackendRequest, CudaFallback, InstallationProfile, LinkMode, DEFAULT_WEIGHTS_URL,
};

/// craftenv - Reproducible conda environment provisioning for protein
/// design toolchains.
#[derive(Debug, Parser)]
#[command(name = "craftenv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Package manager to use (auto probes conda, mamba, micromamba in order)
    #[arg(short = 'p', long = "pkg-manager", value_enum, default_value_t = BackendRequest::Auto)]
    pub pkg_manager: BackendRequest,

    /// Install the GPU variant against this CUDA toolkit version (e.g. 11.8)
    #[arg(short = 'c', long, conflicts_with = "cpu")]
    pub cuda: Option<String>,

    /// Force the CPU-only variant
    #[arg(long)]
    pub cpu: bool,

    /// Environment prefix directory
    #[arg(long, default_value = "./craftenv-env")]
    pub prefix: PathBuf,

    /// Storage directory for extracted model parameters
    #[arg(long, default_value = "./craftenv-weights")]
    pub weights_dir: PathBuf,

    /// Model parameter archive URL
    #[arg(long, default_value = DEFAULT_WEIGHTS_URL)]
    pub weights_url: String,

    /// Skip downloading and publishing model parameters
    #[arg(long)]
    pub skip_weights: bool,

    /// How parameter files are published into the environment
    #[arg(long, value_enum, default_value_t = LinkMode::Symlink)]
    pub link_mode: LinkMode,

    /// Policy when the requested CUDA version is not in the channels
    #[arg(long, value_enum, default_value_t = CudaFallback::Nearest)]
    pub cuda_fallback: CudaFallback,

    /// Override the CUDA virtual package seen by the solver
    #[arg(long, env = "CONDA_OVERRIDE_CUDA")]
    pub cuda_override: Option<String>,

    /// Show verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Minimal output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Build and validate the installation profile.
    pub fn into_profile(self) -> Result<InstallationProfile> {
        let profile = InstallationProfile {
            backend: self.pkg_manager,
            cuda: self.cuda,
            prefix: self.prefix,
            weights_dir: self.weights_dir,
            weights_url: self.weights_url,
            skip_weights: self.skip_weights,
            link_mode: self.link_mode,
            cuda_fallback: self.cuda_fallback,
            cuda_override: self.cuda_override,
            executables: InstallationProfile::default_executables(),
        };
        profile.validate(self.cpu)?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_are_cpu_auto_symlink() {
        let cli = Cli::parse_from(["craftenv"]);
        let profile = cli.into_profile().unwrap();

        assert_eq!(profile.backend, BackendRequest::Auto);
        assert!(profile.cuda.is_none());
        assert_eq!(profile.link_mode, LinkMode::Symlink);
        assert_eq!(profile.cuda_fallback, CudaFallback::Nearest);
    }

    #[test]
    fn cuda_short_flag_selects_gpu_variant() {
        let cli = Cli::parse_from(["craftenv", "-c", "12.1"]);
        let profile = cli.into_profile().unwrap();
        assert_eq!(profile.cuda.as_deref(), Some("12.1"));
    }

    #[test]
    fn cpu_and_cuda_conflict_at_parse_time() {
        let result = Cli::try_parse_from(["craftenv", "--cpu", "--cuda", "12.1"]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_cuda_version_rejected_before_io() {
        let cli = Cli::parse_from(["craftenv", "--cuda", "notaversion"]);
        assert!(cli.into_profile().is_err());
    }

    #[test]
    fn pkg_manager_short_flag() {
        let cli = Cli::parse_from(["craftenv", "-p", "micromamba"]);
        assert_eq!(cli.pkg_manager, BackendRequest::Micromamba);
    }
}
