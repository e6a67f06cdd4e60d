//! Backend discovery and selection.
//!
//! Probes the host for conda, mamba, then micromamba, by PATH lookup for
//! an executable file. An explicit request is honored literally: the
//! resolver never substitutes a different tool than the one asked for.
//! Micromamba is the only tool worth bootstrapping when absent, because
//! it is the only one with no host prerequisites.

use std::path::PathBuf;

use tracing::{debug, info};

use super::{backend_for, bootstrap, Backend, PROBE_ORDER};
use crate::error::{CraftenvError, Result};
use crate::profile::{BackendRequest, ExecutionContext, InstallationProfile};
use crate::shell;

/// PATH entries visible to a probe: the context's additions first, then
/// the process PATH.
fn search_path(ctx: &ExecutionContext) -> Vec<PathBuf> {
    let mut entries = ctx.path_prepend.clone();
    entries.extend(shell::parse_system_path());
    entries
}

fn discover(name: &str, ctx: &ExecutionContext) -> Option<PathBuf> {
    let found = shell::resolve_tool_path(name, &search_path(ctx));
    match &found {
        Some(path) => debug!(tool = name, path = %path.display(), "backend discovered"),
        None => debug!(tool = name, "backend not found on PATH"),
    }
    found
}

/// Select the backend for a run, bootstrapping micromamba if necessary.
pub fn resolve(
    profile: &InstallationProfile,
    ctx: &mut ExecutionContext,
) -> Result<Box<dyn Backend>> {
    match profile.backend {
        BackendRequest::Auto => {
            for name in PROBE_ORDER {
                if let Some(binary) = discover(name, ctx) {
                    info!(tool = name, "selected backend");
                    return Ok(backend_for(name, binary));
                }
            }
            info!("no backend on PATH, falling back to micromamba bootstrap");
            let binary = bootstrap::bootstrap(ctx)?;
            Ok(backend_for("micromamba", binary))
        }
        BackendRequest::Conda | BackendRequest::Mamba => {
            let name = if profile.backend == BackendRequest::Conda {
                "conda"
            } else {
                "mamba"
            };
            match discover(name, ctx) {
                Some(binary) => Ok(backend_for(name, binary)),
                None => Err(CraftenvError::BackendUnavailable {
                    message: format!("{name} was requested but is not on PATH"),
                }),
            }
        }
        BackendRequest::Micromamba => match discover("micromamba", ctx) {
            Some(binary) => Ok(backend_for("micromamba", binary)),
            None => {
                info!("micromamba requested but absent, bootstrapping");
                let binary = bootstrap::bootstrap(ctx)?;
                Ok(backend_for("micromamba", binary))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{CudaFallback, LinkMode, DEFAULT_WEIGHTS_URL};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn fake_tool(dir: &Path, name: &str) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\necho fake\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
    }

    fn profile(backend: BackendRequest) -> InstallationProfile {
        InstallationProfile {
            backend,
            cuda: None,
            prefix: PathBuf::from("/tmp/env"),
            weights_dir: PathBuf::from("/tmp/weights"),
            weights_url: DEFAULT_WEIGHTS_URL.to_string(),
            skip_weights: false,
            link_mode: LinkMode::Symlink,
            cuda_fallback: CudaFallback::Nearest,
            cuda_override: None,
            executables: Vec::new(),
        }
    }

    /// Context whose PATH additions shadow whatever the host has installed.
    fn ctx_with_tools(tools: &[&str]) -> (TempDir, ExecutionContext) {
        let temp = TempDir::new().unwrap();
        for tool in tools {
            fake_tool(temp.path(), tool);
        }
        let mut ctx = ExecutionContext::new().unwrap();
        ctx.prepend_path(temp.path().to_path_buf());
        (temp, ctx)
    }

    #[test]
    fn auto_prefers_conda_over_the_rest() {
        let (_temp, mut ctx) = ctx_with_tools(&["conda", "mamba", "micromamba"]);

        let backend = resolve(&profile(BackendRequest::Auto), &mut ctx).unwrap();
        assert_eq!(backend.name(), "conda");
    }

    #[test]
    fn auto_falls_through_to_mamba() {
        let (temp, mut ctx) = ctx_with_tools(&["mamba", "micromamba"]);

        let backend = resolve(&profile(BackendRequest::Auto), &mut ctx).unwrap();
        // The host may carry a real conda; only assert when our fake dir won
        if backend.binary().starts_with(temp.path()) {
            assert_eq!(backend.name(), "mamba");
        }
    }

    #[test]
    fn explicit_micromamba_uses_discovered_binary() {
        let (temp, mut ctx) = ctx_with_tools(&["micromamba"]);

        let backend = resolve(&profile(BackendRequest::Micromamba), &mut ctx).unwrap();
        assert_eq!(backend.name(), "micromamba");
        assert_eq!(backend.binary(), temp.path().join("micromamba"));
    }

    #[test]
    fn explicit_conda_does_not_substitute() {
        // Fake dir holds only micromamba; a conda request must not take it.
        let (temp, mut ctx) = ctx_with_tools(&["micromamba"]);

        match resolve(&profile(BackendRequest::Conda), &mut ctx) {
            // Host has no real conda: the request must fail, not bootstrap
            Err(err) => assert!(matches!(err, CraftenvError::BackendUnavailable { .. })),
            // Host has a real conda on PATH: fine, but it must be conda
            Ok(backend) => {
                assert_eq!(backend.name(), "conda");
                assert!(!backend.binary().starts_with(temp.path()));
            }
        }
    }
}
