//! Request command - send one raw JSON message through the router

use anyhow::{Context, Result};
use serde_json::Value;
use tally_core::services::LogEvent;

use super::{get_logger, get_monitor, log_event};

pub async fn run(message: &str) -> Result<()> {
    let message: Value = serde_json::from_str(message).context("Request is not valid JSON")?;

    let logger = get_logger();
    let mut event = LogEvent::new("command_executed").with_command("request");
    if let Some(action) = message.get("action").and_then(Value::as_str) {
        event = event.with_action(action);
    }
    log_event(&logger, event);

    let monitor = get_monitor(logger)?;
    let reply = monitor.handle_json(message).await;
    println!("{}", serde_json::to_string_pretty(&reply)?);

    if reply.get("error").is_some() {
        anyhow::bail!("Request failed");
    }
    Ok(())
}
