use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize terminal and run-log output.
///
/// # Arguments
/// * `verbose` - Terminal verbosity (0=info, 1=debug, 2+=trace). `RUST_LOG` wins when set.
/// * `log_path` - Run log, appended to at debug level so every command is recorded.
pub fn setup_logger(verbose: u8, log_path: &Path) -> Result<()> {
    let terminal_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(terminal_directive(verbose)))
        .context("Invalid log filter")?;
    let terminal = fmt::layer()
        .compact()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    let run_log = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(EnvFilter::new("server_init=debug"));

    tracing_subscriber::registry()
        .with(terminal)
        .with(run_log)
        .try_init()
        .context("Failed to install log subscriber")?;
    Ok(())
}

fn terminal_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "server_init=info",
        1 => "server_init=debug",
        _ => "server_init=trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(terminal_directive(0), "server_init=info");
        assert_eq!(terminal_directive(1), "server_init=debug");
        assert_eq!(terminal_directive(5), "server_init=trace");
    }
}
