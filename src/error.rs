//! Error types for craftenv operations.
//!
//! This module defines [`CraftenvError`], the primary error type used
//! throughout the application, and a [`Result`] type alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Use `CraftenvError` for stage failures that need distinct handling
//! - Use `anyhow::Error` (via `CraftenvError::Other`) for unexpected errors
//! - Every fatal error carries enough context to tell the failure
//!   categories apart (network vs archive integrity vs publish step, etc.)
//! - Cache-clean problems are logged warnings, never an error return

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for craftenv operations.
#[derive(Debug, Error)]
pub enum CraftenvError {
    /// No package manager could be discovered on PATH or bootstrapped.
    #[error("No usable package manager: {message}")]
    BackendUnavailable { message: String },

    /// Invalid or contradictory installation profile.
    #[error("Invalid installation profile: {message}")]
    ManifestError { message: String },

    /// The backend rejected or failed to solve the package manifest.
    /// The environment prefix is left on disk for inspection.
    #[error("Environment creation failed at {prefix}: {message}")]
    EnvironmentCreationFailed { prefix: PathBuf, message: String },

    /// Network-level failure fetching the parameter archive.
    #[error("Parameter archive download failed from {url}: {message}")]
    AssetDownloadFailed { url: String, message: String },

    /// The downloaded archive is empty or its table of contents is unreadable.
    #[error("Parameter archive is corrupt: {message}")]
    AssetCorrupt { message: String },

    /// The sentinel file is missing after a claimed-successful publish.
    #[error("Parameter publish verification failed: {sentinel} missing from {publish_dir}")]
    AssetVerificationFailed {
        publish_dir: PathBuf,
        sentinel: String,
    },

    /// Post-install verification found required packages missing.
    #[error("Environment verification failed, missing: {}", missing.join(", "))]
    VerificationFailed { missing: Vec<String> },

    /// A required executable could not be made executable.
    #[error("Failed to set permissions on {path}: {message}")]
    PermissionSetFailed { path: PathBuf, message: String },

    /// An external command failed to spawn or exited non-zero.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CraftenvError {
    /// Short category label shown in the final one-line failure summary.
    pub fn category(&self) -> &'static str {
        match self {
            CraftenvError::BackendUnavailable { .. } => "backend-unavailable",
            CraftenvError::ManifestError { .. } => "manifest-error",
            CraftenvError::EnvironmentCreationFailed { .. } => "environment-creation-failed",
            CraftenvError::AssetDownloadFailed { .. } => "asset-download-failed",
            CraftenvError::AssetCorrupt { .. } => "asset-corrupt",
            CraftenvError::AssetVerificationFailed { .. } => "asset-verification-failed",
            CraftenvError::VerificationFailed { .. } => "verification-failed",
            CraftenvError::PermissionSetFailed { .. } => "permission-set-failed",
            CraftenvError::CommandFailed { .. } => "command-failed",
            CraftenvError::Io(_) => "io-error",
            CraftenvError::Other(_) => "error",
        }
    }
}

/// Result type alias for craftenv operations.
pub type Result<T> = std::result::Result<T, CraftenvError>;
