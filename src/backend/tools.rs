//! The three concrete backend implementations.
//!
//! All three tools share one CLI surface for the operations craftenv
//! needs, so the implementations differ only in channel-isolation flags
//! and name. The solver differences (conda's classic solver vs mamba's
//! libsolv) stay the tools' business.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{clean_args, create_args, list_args, run_args, Backend, InstalledPackage};
use crate::error::{CraftenvError, Result};
use crate::manifest::PackageManifest;
use crate::profile::ExecutionContext;
use crate::shell::{self, CommandResult, OutputLine};

fn stream_create(
    name: &'static str,
    binary: &Path,
    args: &[String],
    ctx: &ExecutionContext,
) -> Result<CommandResult> {
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    shell::run_streaming(binary, &arg_refs, &ctx.command_options(), |line| match line {
        OutputLine::Stdout(text) => debug!(tool = name, "{text}"),
        OutputLine::Stderr(text) => debug!(tool = name, "{text}"),
    })
}

fn run_captured(binary: &Path, args: &[String], ctx: &ExecutionContext) -> Result<CommandResult> {
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    shell::run(binary, &arg_refs, &ctx.command_options())
}

fn parse_list(name: &'static str, result: &CommandResult) -> Result<Vec<InstalledPackage>> {
    if !result.success {
        return Err(CraftenvError::CommandFailed {
            command: format!("{name} list --json"),
            code: result.exit_code,
        });
    }
    serde_json::from_str(&result.stdout).map_err(|e| {
        CraftenvError::Other(anyhow::anyhow!("unparseable `{name} list --json` output: {e}"))
    })
}

macro_rules! conda_family_backend {
    ($type:ident, $name:literal, $($extra_create_flag:literal),*) => {
        #[derive(Debug)]
        pub struct $type {
            binary: PathBuf,
        }

        impl $type {
            pub fn new(binary: PathBuf) -> Self {
                Self { binary }
            }
        }

        impl Backend for $type {
            fn name(&self) -> &'static str {
                $name
            }

            fn binary(&self) -> &Path {
                &self.binary
            }

            fn create_environment(
                &self,
                manifest: &PackageManifest,
                prefix: &Path,
                ctx: &ExecutionContext,
            ) -> Result<CommandResult> {
                let mut args = create_args(manifest, prefix);
                $(args.insert(1, $extra_create_flag.to_string());)*
                stream_create($name, &self.binary, &args, ctx)
            }

            fn run_in_environment(
                &self,
                prefix: &Path,
                command: &[&str],
                ctx: &ExecutionContext,
            ) -> Result<CommandResult> {
                run_captured(&self.binary, &run_args(prefix, command), ctx)
            }

            fn list_installed(
                &self,
                prefix: &Path,
                ctx: &ExecutionContext,
            ) -> Result<Vec<InstalledPackage>> {
                let result = run_captured(&self.binary, &list_args(prefix), ctx)?;
                parse_list($name, &result)
            }

            fn clean_cache(&self, ctx: &ExecutionContext) -> Result<CommandResult> {
                run_captured(&self.binary, &clean_args(), ctx)
            }
        }
    };
}

// conda and mamba inherit channels from ~/.condarc unless told otherwise;
// the manifest's channel list must be the whole story for reproducibility.
conda_family_backend!(CondaBackend, "conda", "--override-channels");
conda_family_backend!(MambaBackend, "mamba", "--override-channels");
// micromamba reads rc files from more locations; --no-rc shuts them all off.
conda_family_backend!(MicromambaBackend, "micromamba", "--no-rc");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::PackageSpec;
    use std::fs;
    use tempfile::TempDir;

    /// Write a fake tool script that records its argv and emits canned output.
    fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn manifest() -> PackageManifest {
        PackageManifest {
            base_packages: vec![PackageSpec::pinned("python", "3.10")],
            variant_packages: vec![PackageSpec::pinned("jax", "0.4.14")],
            channels: vec!["conda-forge".into()],
        }
    }

    #[test]
    fn create_passes_isolation_flag_and_specs() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("argv.log");
        let tool = fake_tool(
            temp.path(),
            "micromamba",
            &format!("echo \"$@\" > {}", log.display()),
        );

        let backend = MicromambaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        let result = backend
            .create_environment(&manifest(), &temp.path().join("env"), &ctx)
            .unwrap();

        assert!(result.success);
        let argv = fs::read_to_string(&log).unwrap();
        assert!(argv.contains("create --no-rc -y"));
        assert!(argv.contains("-c conda-forge"));
        assert!(argv.contains("python=3.10"));
        assert!(argv.contains("jax=0.4.14"));
    }

    #[test]
    fn conda_uses_override_channels() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("argv.log");
        let tool = fake_tool(
            temp.path(),
            "conda",
            &format!("echo \"$@\" > {}", log.display()),
        );

        let backend = CondaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        backend
            .create_environment(&manifest(), &temp.path().join("env"), &ctx)
            .unwrap();

        let argv = fs::read_to_string(&log).unwrap();
        assert!(argv.contains("--override-channels"));
    }

    #[test]
    fn run_in_environment_forwards_command() {
        let temp = TempDir::new().unwrap();
        let tool = fake_tool(temp.path(), "mamba", "echo \"$@\"");

        let backend = MambaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        let result = backend
            .run_in_environment(Path::new("/tmp/env"), &["python", "--version"], &ctx)
            .unwrap();

        assert!(result.success);
        assert!(result.stdout.contains("run -p /tmp/env python --version"));
    }

    #[test]
    fn list_installed_parses_json_output() {
        let temp = TempDir::new().unwrap();
        let tool = fake_tool(
            temp.path(),
            "micromamba",
            r#"echo '[{"name":"jax","version":"0.4.14"},{"name":"python","version":"3.10.13"}]'"#,
        );

        let backend = MicromambaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        let packages = backend.list_installed(Path::new("/tmp/env"), &ctx).unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "jax");
    }

    #[test]
    fn list_installed_failure_is_command_failed() {
        let temp = TempDir::new().unwrap();
        let tool = fake_tool(temp.path(), "conda", "exit 3");

        let backend = CondaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        let err = backend
            .list_installed(Path::new("/tmp/env"), &ctx)
            .unwrap_err();

        assert!(matches!(err, CraftenvError::CommandFailed { code: Some(3), .. }));
    }

    #[test]
    fn clean_cache_invokes_clean_all() {
        let temp = TempDir::new().unwrap();
        let tool = fake_tool(temp.path(), "micromamba", "echo \"$@\"");

        let backend = MicromambaBackend::new(tool);
        let ctx = ExecutionContext::new().unwrap();
        let result = backend.clean_cache(&ctx).unwrap();

        assert!(result.stdout.contains("clean -a -y"));
    }
}
