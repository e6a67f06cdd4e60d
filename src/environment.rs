//! Environment materialization.
//!
//! The primary install is one backend `create` call carrying the entire
//! manifest, so the solver resolves conflicts across the full package set
//! instead of compounding partial decisions. Pip extras run afterwards,
//! through the environment's own interpreter; the host interpreter is
//! never touched.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::backend::Backend;
use crate::error::{CraftenvError, Result};
use crate::manifest::PackageManifest;
use crate::profile::ExecutionContext;

/// A materialized environment prefix.
#[derive(Debug, Clone)]
pub struct Environment {
    pub prefix: PathBuf,
}

/// A package installed via pip after the primary environment exists.
#[derive(Debug, Clone)]
pub struct PipExtra {
    /// Pip requirement specifier (may be a git URL).
    pub requirement: String,
    /// Install with `--no-deps`, for research packages whose declared
    /// dependency lists conflict with the solved environment.
    pub no_deps: bool,
    /// Module name to import as a smoke test, if any.
    pub import_probe: Option<String>,
}

/// Pip-only packages the primary channels do not carry.
pub fn default_pip_extras() -> Vec<PipExtra> {
    vec![PipExtra {
        requirement: "git+https://github.com/sokrypton/ColabDesign.git".to_string(),
        no_deps: true,
        import_probe: Some("colabdesign".to_string()),
    }]
}

/// Truncate backend output to the last few lines for a failure message.
fn failure_excerpt(stderr: &str, stdout: &str) -> String {
    let source = if stderr.trim().is_empty() { stdout } else { stderr };
    let lines: Vec<&str> = source.lines().collect();
    let tail = lines.len().saturating_sub(15);
    lines[tail..].join("\n")
}

/// Create the environment at `prefix` from the manifest in one solver
/// transaction. On failure the prefix directory is left as-is for
/// operator inspection.
pub fn materialize(
    backend: &dyn Backend,
    manifest: &PackageManifest,
    prefix: &Path,
    ctx: &ExecutionContext,
) -> Result<Environment> {
    info!(
        tool = backend.name(),
        prefix = %prefix.display(),
        packages = manifest.render_packages().len(),
        "creating environment"
    );

    let result = backend.create_environment(manifest, prefix, ctx)?;
    if !result.success {
        return Err(CraftenvError::EnvironmentCreationFailed {
            prefix: prefix.to_path_buf(),
            message: failure_excerpt(&result.stderr, &result.stdout),
        });
    }

    Ok(Environment {
        prefix: prefix.to_path_buf(),
    })
}

/// Install pip-only extras into an existing environment.
pub fn install_pip_extras(
    backend: &dyn Backend,
    environment: &Environment,
    extras: &[PipExtra],
    ctx: &ExecutionContext,
) -> Result<()> {
    for extra in extras {
        info!(requirement = %extra.requirement, "installing pip extra");

        let mut command = vec!["pip", "install", extra.requirement.as_str()];
        if extra.no_deps {
            command.push("--no-deps");
        }

        let result = backend.run_in_environment(&environment.prefix, &command, ctx)?;
        if !result.success {
            return Err(CraftenvError::EnvironmentCreationFailed {
                prefix: environment.prefix.clone(),
                message: format!(
                    "pip install {} failed: {}",
                    extra.requirement,
                    failure_excerpt(&result.stderr, &result.stdout)
                ),
            });
        }

        if let Some(module) = &extra.import_probe {
            let probe = format!("import {module}");
            let result = backend.run_in_environment(
                &environment.prefix,
                &["python", "-c", &probe],
                ctx,
            )?;
            if !result.success {
                return Err(CraftenvError::EnvironmentCreationFailed {
                    prefix: environment.prefix.clone(),
                    message: format!("{module} installed but not importable"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InstalledPackage;
    use crate::shell::CommandResult;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Backend stub that records invocations and replays canned results.
    struct StubBackend {
        create_ok: bool,
        failing_command: Option<String>,
        calls: RefCell<Vec<String>>,
    }

    impl StubBackend {
        fn new() -> Self {
            Self {
                create_ok: true,
                failing_command: None,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn result(&self, success: bool) -> CommandResult {
            CommandResult {
                exit_code: Some(if success { 0 } else { 1 }),
                stdout: String::new(),
                stderr: if success {
                    String::new()
                } else {
                    "solver error: nothing provides cudatoolkit".to_string()
                },
                duration: Duration::from_millis(1),
                success,
            }
        }
    }

    impl Backend for StubBackend {
        fn name(&self) -> &'static str {
            "stub"
        }

        fn binary(&self) -> &Path {
            Path::new("/stub")
        }

        fn create_environment(
            &self,
            _manifest: &PackageManifest,
            _prefix: &Path,
            _ctx: &ExecutionContext,
        ) -> Result<CommandResult> {
            self.calls.borrow_mut().push("create".to_string());
            Ok(self.result(self.create_ok))
        }

        fn run_in_environment(
            &self,
            _prefix: &Path,
            command: &[&str],
            _ctx: &ExecutionContext,
        ) -> Result<CommandResult> {
            let joined = command.join(" ");
            let failed = self
                .failing_command
                .as_ref()
                .is_some_and(|needle| joined.contains(needle));
            self.calls.borrow_mut().push(joined);
            Ok(self.result(!failed))
        }

        fn list_installed(
            &self,
            _prefix: &Path,
            _ctx: &ExecutionContext,
        ) -> Result<Vec<InstalledPackage>> {
            Ok(Vec::new())
        }

        fn clean_cache(&self, _ctx: &ExecutionContext) -> Result<CommandResult> {
            Ok(self.result(true))
        }
    }

    fn manifest() -> PackageManifest {
        PackageManifest {
            base_packages: vec![crate::manifest::PackageSpec::pinned("python", "3.10")],
            variant_packages: vec![crate::manifest::PackageSpec::pinned("jax", "0.4.14")],
            channels: vec!["conda-forge".into()],
        }
    }

    #[test]
    fn materialize_returns_environment_on_success() {
        let backend = StubBackend::new();
        let ctx = ExecutionContext::new().unwrap();

        let env = materialize(&backend, &manifest(), Path::new("/tmp/env"), &ctx).unwrap();
        assert_eq!(env.prefix, Path::new("/tmp/env"));
        assert_eq!(backend.calls.borrow().as_slice(), ["create"]);
    }

    #[test]
    fn materialize_failure_carries_solver_output() {
        let backend = StubBackend {
            create_ok: false,
            ..StubBackend::new()
        };
        let ctx = ExecutionContext::new().unwrap();

        let err = materialize(&backend, &manifest(), Path::new("/tmp/env"), &ctx).unwrap_err();
        match err {
            CraftenvError::EnvironmentCreationFailed { message, .. } => {
                assert!(message.contains("nothing provides cudatoolkit"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn pip_extras_install_then_probe() {
        let backend = StubBackend::new();
        let ctx = ExecutionContext::new().unwrap();
        let env = Environment {
            prefix: PathBuf::from("/tmp/env"),
        };

        install_pip_extras(&backend, &env, &default_pip_extras(), &ctx).unwrap();

        let calls = backend.calls.borrow();
        assert!(calls[0].contains("pip install"));
        assert!(calls[0].contains("--no-deps"));
        assert!(calls[1].contains("import colabdesign"));
    }

    #[test]
    fn pip_extra_import_failure_is_fatal() {
        let backend = StubBackend {
            failing_command: Some("import colabdesign".to_string()),
            ..StubBackend::new()
        };
        let ctx = ExecutionContext::new().unwrap();
        let env = Environment {
            prefix: PathBuf::from("/tmp/env"),
        };

        let err = install_pip_extras(&backend, &env, &default_pip_extras(), &ctx).unwrap_err();
        assert!(err.to_string().contains("not importable"));
    }

    #[test]
    fn failure_excerpt_prefers_stderr_and_truncates() {
        let stdout = "ignored";
        let stderr: String = (0..40)
            .map(|i| format!("line {i}\n"))
            .collect();

        let excerpt = failure_excerpt(&stderr, stdout);
        assert!(excerpt.contains("line 39"));
        assert!(!excerpt.contains("line 0"));
        assert!(!excerpt.contains("ignored"));
    }
}
