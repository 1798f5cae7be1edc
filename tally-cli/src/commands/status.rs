//! Status command - stored settings and key state

use anyhow::Result;
use colored::Colorize;

use super::get_monitor;
use crate::output;

fn format_period(secs: u64) -> String {
    if secs % 60 == 0 {
        format!("{} min", secs / 60)
    } else {
        format!("{} s", secs)
    }
}

pub async fn run(json: bool) -> Result<()> {
    let monitor = get_monitor(None)?;
    let status = monitor.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Tally Status".bold());
    println!();

    let mut table = output::create_table();
    let key_state = if status.has_api_key {
        "stored".green().to_string()
    } else {
        "not set".yellow().to_string()
    };
    table.add_row(vec!["API key".to_string(), key_state]);
    table.add_row(vec![
        "Encryption key".to_string(),
        status
            .key_fingerprint
            .clone()
            .unwrap_or_else(|| "none".to_string()),
    ]);
    table.add_row(vec![
        "Refresh interval".to_string(),
        format_period(u64::from(status.refresh_interval_minutes) * 60),
    ]);
    table.add_row(vec!["Currency".to_string(), monitor.config.currency.clone()]);
    table.add_row(vec!["API".to_string(), monitor.config.api_base_url.clone()]);
    println!("{}", table);

    if !status.has_api_key {
        println!();
        output::info("Run `tally set-key` to store your DeepSeek API key.");
    }

    Ok(())
}
