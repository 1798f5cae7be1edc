//! Refresh command - fetch the balance now

use anyhow::{bail, Result};
use tally_core::services::LogEvent;
use tally_core::{OperationResult, Request, Response};

use super::{finish_spinner, get_logger, get_monitor, into_result, log_event, spinner};
use crate::output;

pub async fn run(json: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("refresh"));
    let monitor = get_monitor(logger)?;

    let bar = if json { None } else { spinner("Fetching balance...") };
    let reply = monitor.handle(Request::ForceRefresh).await;
    finish_spinner(bar);

    let result = into_result(reply);
    if json {
        let result: OperationResult<Response> = match result {
            Ok(response) => OperationResult::ok(response),
            Err(e) => OperationResult::fail(e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.is_err() && !monitor.vault().has_credential().await.unwrap_or(true) {
        output::info("Run `tally set-key` to store your DeepSeek API key.");
    }

    match result? {
        Response::Balance(snapshot) => {
            output::print_snapshot(&snapshot, monitor.config.low_balance_threshold);
            Ok(())
        }
        other => bail!("Unexpected response: {:?}", other),
    }
}
