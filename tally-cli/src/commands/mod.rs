//! CLI command implementations

pub mod daemon;
pub mod interval;
pub mod key;
pub mod logs;
pub mod refresh;
pub mod request;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tally_core::adapters::indicator::TracingIndicator;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::{Monitor, Reply, Response};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<Arc<LoggingService>> {
    let tally_dir = get_tally_dir().ok()?;
    LoggingService::new(&tally_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION"))
        .ok()
        .map(Arc::new)
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        let _ = l.log(event);
    }
}

/// Get the tally directory from `TALLY_DIR` or `~/.tally`
pub fn get_tally_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("TALLY_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".tally"))
        .context("Could not find home directory; set TALLY_DIR")
}

/// Open the monitor on the tally directory
///
/// Nothing is activated: one-shot commands do not arm timers or trigger
/// the initial refresh.
pub fn get_monitor(logger: Option<Arc<LoggingService>>) -> Result<Monitor> {
    let tally_dir = get_tally_dir()?;
    std::fs::create_dir_all(&tally_dir)
        .with_context(|| format!("Failed to create tally directory: {:?}", tally_dir))?;

    Monitor::open(&tally_dir, Arc::new(TracingIndicator), logger)
        .context("Failed to initialize monitor")
}

/// Turn a router reply into a result
pub fn into_result(reply: Reply) -> Result<Response> {
    match reply {
        Reply::Ok(response) => Ok(response),
        Reply::Err { error } => Err(anyhow!(error)),
    }
}

/// Spinner on stderr, only when attached to a terminal
pub fn spinner(message: &str) -> Option<ProgressBar> {
    if atty::isnt(atty::Stream::Stderr) {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    Some(bar)
}

pub fn finish_spinner(bar: Option<ProgressBar>) {
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}
