//! craftenv - Reproducible conda environment provisioning for protein
//! design toolchains.
//!
//! craftenv materializes an isolated conda-family environment carrying a
//! pinned scientific stack (JAX, structural-biology tooling, optional
//! CUDA variants), installs the pip-only extras the channels do not
//! carry, provisions the trained model-parameter bundle exactly once,
//! and verifies the result before declaring success.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`profile`] - Installation profile and execution context
//! - [`backend`] - Conda-family package-manager backends and resolution
//! - [`manifest`] - Variant-specific package manifest construction
//! - [`environment`] - Environment materialization and pip extras
//! - [`assets`] - Model-parameter bundle provisioning
//! - [`verify`] - Post-install verification
//! - [`finalize`] - Permission fixups and cache cleanup
//! - [`orchestrator`] - Fail-fast stage sequencing
//! - [`shell`] - External process execution
//! - [`ui`] - Terminal output and progress
//! - [`error`] - Error types and result alias

pub mod assets;
pub mod backend;
pub mod cli;
pub mod environment;
pub mod error;
pub mod finalize;
pub mod manifest;
pub mod orchestrator;
pub mod profile;
pub mod shell;
pub mod ui;
pub mod verify;

pub use error::{CraftenvError, Result};
