//! Micromamba bootstrap.
//!
//! When no backend is discoverable, a single static micromamba binary is
//! downloaded into the run's scratch directory and exposed through the
//! execution context's PATH. Nothing outside the scratch directory is
//! touched, so a bootstrapped run leaves no trace on the host beyond the
//! environment it was asked to build.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CraftenvError, Result};
use crate::profile::ExecutionContext;
use crate::shell::{self, CommandOptions};

/// Release endpoint serving the latest static micromamba as a tar.bz2.
const BOOTSTRAP_BASE_URL: &str = "https://micro.mamba.pm/api/micromamba";

/// Archive member holding the binary.
const ARCHIVE_MEMBER: &str = "bin/micromamba";

/// Platform identifier used by the release endpoint.
pub fn platform() -> Result<&'static str> {
    let platform = if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        "linux-64"
    } else if cfg!(all(target_os = "linux", target_arch = "aarch64")) {
        "linux-aarch64"
    } else if cfg!(all(target_os = "macos", target_arch = "x86_64")) {
        "osx-64"
    } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "osx-arm64"
    } else if cfg!(target_os = "windows") {
        "win-64"
    } else {
        return Err(CraftenvError::BackendUnavailable {
            message: "no micromamba build published for this platform".into(),
        });
    };
    Ok(platform)
}

/// URL of the latest micromamba archive for this host.
pub fn bootstrap_url() -> Result<String> {
    Ok(format!("{BOOTSTRAP_BASE_URL}/{}/latest", platform()?))
}

fn download_archive(url: &str, dest: &Path) -> Result<()> {
    let unavailable = |message: String| CraftenvError::BackendUnavailable { message };

    let response = reqwest::blocking::get(url)
        .map_err(|e| unavailable(format!("bootstrap download failed: {e}")))?;
    if !response.status().is_success() {
        return Err(unavailable(format!(
            "bootstrap download failed: HTTP {} from {url}",
            response.status()
        )));
    }

    let mut file = fs::File::create(dest)?;
    let mut reader = response;
    io::copy(&mut reader, &mut file)?;
    Ok(())
}

/// Extract `bin/micromamba` from a downloaded archive and install it as an
/// executable under `dest_dir`.
///
/// The archive is bzip2-compressed; extraction goes through the system
/// `tar`, the one host prerequisite this path keeps.
pub fn install_from_archive(archive: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let result = shell::run(
        Path::new("tar"),
        &[
            "-xjf",
            &archive.display().to_string(),
            "-C",
            &dest_dir.display().to_string(),
            ARCHIVE_MEMBER,
        ],
        &CommandOptions::default(),
    )?;
    if !result.success {
        return Err(CraftenvError::BackendUnavailable {
            message: format!(
                "bootstrap archive extraction failed: {}",
                result.stderr.trim()
            ),
        });
    }

    let extracted = dest_dir.join(ARCHIVE_MEMBER);
    let binary = dest_dir.join("micromamba");
    fs::rename(&extracted, &binary)?;
    let _ = fs::remove_dir(dest_dir.join("bin"));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&binary, fs::Permissions::from_mode(0o755))?;
    }

    Ok(binary)
}

/// Download micromamba into the scratch directory and expose it on the
/// context PATH. Returns the installed binary path.
pub fn bootstrap(ctx: &mut ExecutionContext) -> Result<PathBuf> {
    bootstrap_from(ctx, &bootstrap_url()?)
}

/// Bootstrap from an explicit archive URL.
pub fn bootstrap_from(ctx: &mut ExecutionContext, url: &str) -> Result<PathBuf> {
    info!(url, "bootstrapping micromamba into scratch directory");

    let archive = ctx.scratch_dir().join("micromamba.tar.bz2");
    download_archive(url, &archive)?;

    let binary = install_from_archive(&archive, ctx.scratch_dir())?;
    let _ = fs::remove_file(&archive);

    let scratch = ctx.scratch_dir().to_path_buf();
    ctx.prepend_path(scratch);
    info!(binary = %binary.display(), "micromamba installed");
    Ok(binary)
}
