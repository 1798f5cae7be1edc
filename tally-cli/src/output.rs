//! Output formatting utilities

use chrono::Local;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use rust_decimal::Decimal;

use tally_core::domain::{BadgeColor, Indicator, IndicatorInput};
use tally_core::BalanceSnapshot;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Print a balance snapshot with its badge
pub fn print_snapshot(snapshot: &BalanceSnapshot, low_threshold: Decimal) {
    let badge = Indicator::derive(IndicatorInput::Snapshot(snapshot), low_threshold);
    let badge_text = match badge.color {
        Some(BadgeColor::Low) => badge.text.red().bold().to_string(),
        Some(BadgeColor::Alert) => badge.text.yellow().bold().to_string(),
        _ => badge.text.green().bold().to_string(),
    };

    let mut table = create_table();
    table.set_header(vec!["", snapshot.currency.as_str()]);
    table.add_row(vec![Cell::new("Total"), Cell::new(snapshot.total)]);
    table.add_row(vec![Cell::new("Topped up"), Cell::new(snapshot.topped_up)]);
    table.add_row(vec![Cell::new("Granted"), Cell::new(snapshot.granted)]);
    println!("{}", table);
    println!(
        "Badge: {}   Updated: {}",
        badge_text,
        snapshot
            .last_updated
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
    );
}
