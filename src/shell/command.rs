//! Process execution for package-manager backends and helper tools.
//!
//! Backends are always invoked directly (program + argument vector), never
//! through a shell, so package pins like `numpy<2.0.0` need no quoting and
//! PATH injection stays explicit. The augmented PATH matters for one case:
//! a bootstrapped micromamba lives in a scratch directory that the parent
//! process PATH has never heard of.

use crate::error::{CraftenvError, Result};
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of executing an external command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command succeeded (exit code 0).
    pub success: bool,
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Extra environment variables (merged with the system env).
    pub env: HashMap<String, String>,

    /// Directories prepended to PATH for this invocation.
    pub path_prepend: Vec<PathBuf>,
}

impl CommandOptions {
    /// Compute the PATH value for this invocation: prepended entries
    /// followed by the current process PATH.
    fn effective_path(&self) -> Option<std::ffi::OsString> {
        if self.path_prepend.is_empty() {
            return None;
        }
        let mut entries = self.path_prepend.clone();
        if let Some(system) = std::env::var_os("PATH") {
            entries.extend(std::env::split_paths(&system));
        }
        std::env::join_paths(entries).ok()
    }
}

/// Output line from a streamed command.
#[derive(Debug, Clone)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

fn build_command(program: &Path, args: &[&str], options: &CommandOptions) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    if let Some(path) = options.effective_path() {
        cmd.env("PATH", path);
    }

    cmd
}

fn display_command(program: &Path, args: &[&str]) -> String {
    let mut rendered = program.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

/// Execute a command, capturing stdout and stderr.
///
/// Spawn failures map to [`CraftenvError::CommandFailed`]; a non-zero exit
/// is reported in the returned [`CommandResult`], not as an error, so
/// callers can attach stage-specific context.
pub fn run(program: &Path, args: &[&str], options: &CommandOptions) -> Result<CommandResult> {
    let start = Instant::now();
    let mut cmd = build_command(program, args, options);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let output = cmd.output().map_err(|_| CraftenvError::CommandFailed {
        command: display_command(program, args),
        code: None,
    })?;

    let duration = start.elapsed();
    Ok(CommandResult {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration,
        success: output.status.success(),
    })
}

/// Execute a command, forwarding each output line to a callback as it
/// arrives. Used for long-running backend operations (environment solve,
/// archive extraction) where buffered output would look like a hang.
pub fn run_streaming(
    program: &Path,
    args: &[&str],
    options: &CommandOptions,
    mut callback: impl FnMut(OutputLine),
) -> Result<CommandResult> {
    let start = Instant::now();
    let mut cmd = build_command(program, args, options);
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|_| CraftenvError::CommandFailed {
        command: display_command(program, args),
        code: None,
    })?;

    let stdout = child.stdout.take().expect("stdout requested");
    let stderr = child.stderr.take().expect("stderr requested");

    let (tx, rx) = mpsc::channel();
    let tx_stdout = tx.clone();
    let tx_stderr = tx;

    let stdout_handle = thread::spawn(move || {
        let reader = BufReader::new(stdout);
        let mut output = String::new();
        for line in reader.lines().map_while(std::result::Result::ok) {
            output.push_str(&line);
            output.push('\n');
            let _ = tx_stdout.send(OutputLine::Stdout(line));
        }
        output
    });

    let stderr_handle = thread::spawn(move || {
        let reader = BufReader::new(stderr);
        let mut output = String::new();
        for line in reader.lines().map_while(std::result::Result::ok) {
            output.push_str(&line);
            output.push('\n');
            let _ = tx_stderr.send(OutputLine::Stderr(line));
        }
        output
    });

    for line in rx {
        callback(line);
    }

    let stdout_output = stdout_handle.join().unwrap_or_default();
    let stderr_output = stderr_handle.join().unwrap_or_default();

    let status = child.wait().map_err(|_| CraftenvError::CommandFailed {
        command: display_command(program, args),
        code: None,
    })?;

    Ok(CommandResult {
        exit_code: status.code(),
        stdout: stdout_output,
        stderr: stderr_output,
        duration: start.elapsed(),
        success: status.success(),
    })
}

/// Check whether a tool responds to `--version` (on the given PATH entries).
///
/// Looks the binary up by name rather than path so that probing behaves
/// the same way the eventual backend invocation will.
pub fn probe_tool(name: &str, path_prepend: &[PathBuf]) -> bool {
    let options = CommandOptions {
        path_prepend: path_prepend.to_vec(),
        ..Default::default()
    };
    run(Path::new(name), &["--version"], &options)
        .map(|r| r.success)
        .unwrap_or(false)
}

/// Check whether a file has executable permission bits set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On Windows, executability is determined by file extension, not permission bits.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.extension().is_some_and(|ext| {
        ["exe", "bat", "cmd"]
            .iter()
            .any(|e| std::ffi::OsStr::new(e) == ext)
    })
}

/// Resolve a tool's binary path by iterating over PATH entries.
///
/// Returns the first match that exists and is executable. Does NOT use
/// the `which` command, whose behavior varies across systems.
pub fn resolve_tool_path(tool: &str, path_entries: &[PathBuf]) -> Option<PathBuf> {
    for dir in path_entries {
        let candidate = dir.join(tool);
        if candidate.is_file() && is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// Parse the system PATH environment variable into a list of directories.
pub fn parse_system_path() -> Vec<PathBuf> {
    std::env::var_os("PATH")
        .map(|path| std::env::split_paths(&path).collect())
        .unwrap_or_default()
}
