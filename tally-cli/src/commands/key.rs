//! Key commands - store, check, and remove the API key

use anyhow::{bail, Result};
use dialoguer::{Confirm, Password};
use tally_core::services::LogEvent;
use tally_core::{Request, Response};

use super::{finish_spinner, get_logger, get_monitor, into_result, log_event, spinner};
use crate::output;

/// Key from the flag, or prompt for it without echo
fn key_or_prompt(key: Option<String>) -> Result<String> {
    let key = match key {
        Some(k) => k,
        None => Password::new().with_prompt("DeepSeek API key").interact()?,
    };
    let key = key.trim().to_string();
    if key.is_empty() {
        bail!("API key cannot be empty");
    }
    Ok(key)
}

async fn validate(monitor: &tally_core::Monitor, key: &str) -> Result<bool> {
    let bar = spinner("Checking key...");
    let reply = monitor
        .handle(Request::ValidateApiKey {
            api_key: key.to_string(),
        })
        .await;
    finish_spinner(bar);

    match into_result(reply)? {
        Response::Validation { success } => Ok(success),
        other => bail!("Unexpected response: {:?}", other),
    }
}

pub async fn run_set(key: Option<String>, skip_validate: bool) -> Result<()> {
    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("set-key"));
    let key = key_or_prompt(key)?;
    let monitor = get_monitor(logger.clone())?;

    if !skip_validate && !validate(&monitor, &key).await? {
        bail!("The API rejected this key; nothing was stored");
    }

    let bar = spinner("Storing key and fetching balance...");
    let reply = monitor.handle(Request::SetApiKey { key }).await;
    finish_spinner(bar);

    match into_result(reply) {
        Ok(Response::Balance(snapshot)) => {
            output::success("API key stored.");
            output::print_snapshot(&snapshot, monitor.config.low_balance_threshold);
            Ok(())
        }
        Ok(other) => bail!("Unexpected response: {:?}", other),
        Err(e) => {
            // The key is stored even when the first fetch fails
            if monitor.vault().has_credential().await? {
                output::success("API key stored.");
                output::warning(&format!("Could not fetch the balance yet: {}", e));
                Ok(())
            } else {
                Err(e)
            }
        }
    }
}

pub async fn run_validate(key: Option<String>) -> Result<()> {
    let key = key_or_prompt(key)?;
    let monitor = get_monitor(get_logger())?;

    if validate(&monitor, &key).await? {
        output::success("Key is valid.");
        Ok(())
    } else {
        bail!("Key was rejected by the API")
    }
}

pub async fn run_reset(force: bool) -> Result<()> {
    if !force
        && !Confirm::new()
            .with_prompt("Remove the stored API key and its encryption key?")
            .default(false)
            .interact()?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let logger = get_logger();
    log_event(&logger, LogEvent::new("command_executed").with_command("reset"));
    let monitor = get_monitor(logger)?;
    monitor.reset().await?;

    output::success("Stored API key removed.");
    Ok(())
}
