//! End-of-run fixups: executable permissions and cache cleanup.

use std::path::Path;

use tracing::{info, warn};

use crate::backend::Backend;
use crate::error::{CraftenvError, Result};
use crate::profile::{ExecutableFixup, ExecutionContext};
use crate::ui;

/// Ensure helper binaries carry the executable bit.
///
/// Optional binaries that are absent or refuse the chmod degrade to a
/// warning; a required one is fatal.
pub fn fix_permissions(working_dir: &Path, executables: &[ExecutableFixup]) -> Result<()> {
    for fixup in executables {
        let path = working_dir.join(&fixup.path);
        match set_executable(&path) {
            Ok(()) => info!(path = %path.display(), "executable bit set"),
            Err(e) if fixup.required => {
                return Err(CraftenvError::PermissionSetFailed {
                    path,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                ui::warning(&format!(
                    "skipping optional executable {}: {e}",
                    path.display()
                ));
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable(path: &Path) -> std::io::Result<()> {
    std::fs::metadata(path).map(|_| ())
}

/// Drop the backend's package caches. Failures are warnings only; a full
/// cache costs disk space, not correctness.
pub fn clean_cache(backend: &dyn Backend, ctx: &ExecutionContext) {
    match backend.clean_cache(ctx) {
        Ok(result) if result.success => info!(tool = backend.name(), "package cache cleaned"),
        Ok(result) => warn!(
            tool = backend.name(),
            code = ?result.exit_code,
            "cache clean failed: {}",
            result.stderr.trim()
        ),
        Err(e) => warn!(tool = backend.name(), "cache clean failed: {e}"),
    }
}
