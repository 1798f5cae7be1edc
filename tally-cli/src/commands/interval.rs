//! Interval command - set the refresh interval

use anyhow::Result;
use serde_json::json;
use tally_core::domain::balance::MAX_INTERVAL_MINUTES;
use tally_core::services::LogEvent;
use tally_core::{OperationResult, Request};

use super::{get_logger, get_monitor, into_result, log_event};
use crate::output;

pub async fn run(minutes: i64, json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("interval"));
    let monitor = get_monitor(logger)?;

    into_result(
        monitor
            .handle(Request::SetRefreshInterval { interval: minutes })
            .await,
    )?;
    // The stored value is the clamped one
    let applied = monitor.status().await?.refresh_interval_minutes;

    if json {
        let result = OperationResult::ok(json!({ "intervalMinutes": applied }))
            .with_context("requested", json!(minutes));
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if i64::from(applied) != minutes {
        output::warning(&format!(
            "{} is outside 1..={}; using {}",
            minutes, MAX_INTERVAL_MINUTES, applied
        ));
    }
    output::success(&format!("Refresh interval set to {} minutes.", applied));
    Ok(())
}
