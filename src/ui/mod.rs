//! Terminal output: stage status lines, durations, download progress.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Format a duration the way the final summary reports it.
///
/// Provisioning runs span hours, so the long form counts hours, minutes
/// and seconds rather than fractional units.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        return format!("{secs}s");
    }
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else {
        format!("{minutes}m {seconds}s")
    }
}

/// Announce a stage starting.
pub fn stage(label: &str) {
    println!("{} {label}", style("==>").cyan().bold());
}

/// Report a stage (or the full run) succeeding.
pub fn success(message: &str) {
    println!("{} {message}", style("✔").green());
}

/// Report a non-fatal problem.
pub fn warning(message: &str) {
    eprintln!("{} {message}", style("!").yellow());
}

/// Report a fatal failure.
pub fn failure(message: &str) {
    eprintln!("{} {message}", style("✘").red().bold());
}

/// Progress bar for an archive download, byte-denominated when the server
/// reports a content length, a plain spinner otherwise.
pub fn download_bar(total_bytes: Option<u64>) -> ProgressBar {
    match total_bytes {
        Some(total) => {
            let bar = ProgressBar::new(total);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{bar:30.cyan/dim} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")
                    .expect("valid template"),
            );
            bar
        }
        None => {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {bytes} downloaded")
                    .expect("valid template"),
            );
            bar
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_duration_seconds() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
    }

    #[test]
    fn format_duration_minutes() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }

    #[test]
    fn format_duration_hours() {
        assert_eq!(format_duration(Duration::from_secs(3723)), "1h 2m 3s");
    }

    #[test]
    fn format_duration_zero() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
    }

    #[test]
    fn download_bar_with_and_without_length() {
        let sized = download_bar(Some(1024));
        assert_eq!(sized.length(), Some(1024));
        let unsized_bar = download_bar(None);
        assert!(unsized_bar.length().is_none());
        sized.finish_and_clear();
        unsized_bar.finish_and_clear();
    }
}
