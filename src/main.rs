//! craftenv CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use craftenv::cli::Cli;
use craftenv::orchestrator::Orchestrator;
use craftenv::ui;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. `--verbose`/`--quiet` flags, otherwise INFO
fn init_tracing(cli: &Cli) {
    let filter = if cli.debug {
        EnvFilter::new("craftenv=debug")
    } else if cli.quiet {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("craftenv=warn"))
    } else if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("craftenv=debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("craftenv=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    tracing::debug!("craftenv starting with args: {:?}", cli);

    let profile = match cli.into_profile() {
        Ok(profile) => profile,
        Err(e) => {
            ui::failure(&format!("[{}] {e}", e.category()));
            return ExitCode::from(1);
        }
    };
    let prefix = profile.prefix.clone();

    let orchestrator = match Orchestrator::new(profile) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            ui::failure(&format!("[{}] {e}", e.category()));
            return ExitCode::from(1);
        }
    };

    let outcome = orchestrator.run();
    let elapsed = ui::format_duration(outcome.elapsed);

    match &outcome.error {
        None => {
            ui::success(&format!(
                "Done in {elapsed}. Environment ready at {}",
                prefix.display()
            ));
        }
        Some(error) => {
            ui::failure(&format!(
                "[{}] failed at stage {} after {elapsed}: {error}",
                error.category(),
                outcome.stage.label()
            ));
        }
    }

    ExitCode::from(outcome.exit_code())
}
