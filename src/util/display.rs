/// Display utilities for terminal output

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::core::{CoinData, MonitorStatus, Notification, VolumeAlert};
use crate::util::format::{abbreviate_address, format_change};

fn colorize_change(change: f64) -> colored::ColoredString {
    let text = format_change(change);
    if change > 0.0 {
        text.green()
    } else if change < 0.0 {
        text.red()
    } else {
        text.dimmed()
    }
}

/// Renders the market table: one line per symbol, one cell per timeframe
/// with the current change/volume next to the previous candle's.
pub fn print_market_overview(data: &[CoinData], last_updated: DateTime<Utc>) {
    println!(
        "\n{} {}",
        "MARKET".bold(),
        format!("(updated {})", last_updated.format("%H:%M:%S")).dimmed()
    );
    println!("{}", "=".repeat(78));

    for coin in data {
        print!("{:<6} ${:<12}", coin.symbol.bold(), coin.price);
        for (timeframe, kline) in &coin.klines {
            print!(
                " | {} {} {} vol {}",
                timeframe.label().dimmed(),
                colorize_change(kline.prev_change),
                colorize_change(kline.change),
                kline.volume
            );
        }
        println!();
    }
}

/// Renders the alert buffer, newest first.
pub fn print_alerts(alerts: &[VolumeAlert]) {
    if alerts.is_empty() {
        return;
    }

    println!("\n{}", "VOLUME ALERTS".bold());
    for alert in alerts {
        println!(
            "   {} {} [{}] volume {} price {} ({})",
            alert.symbol.bold(),
            alert.timeframe.label(),
            alert.stage.label().dimmed(),
            format!("+{:.2}%", alert.volume_change).green(),
            colorize_change(alert.price_change),
            alert.timestamp.format("%H:%M:%S")
        );
    }
}

/// Renders one wallet-activity notification as it arrives.
pub fn print_notification(notification: &Notification) {
    println!(
        "\n{} {} {}",
        "WALLET ACTIVITY".bold(),
        abbreviate_address(&notification.wallet_address).bold(),
        notification
            .timestamp
            .format("%H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!(
        "   from {}",
        abbreviate_address(&notification.from_address)
    );
    if let Some(token) = &notification.from_token {
        println!("   sent {} {}", token.amount.red(), token.symbol);
    }
    println!("   to   {}", abbreviate_address(&notification.to_address));
    if let Some(token) = &notification.to_token {
        println!("   recv {} {}", token.amount.green(), token.symbol);
    }
}

/// One-line monitoring summary: how many subscriptions are live.
pub fn print_monitoring_summary(statuses: &HashMap<String, MonitorStatus>) {
    let live = statuses
        .values()
        .filter(|s| **s == MonitorStatus::Monitoring)
        .count();
    let marker = if live > 0 {
        "●".green()
    } else {
        "●".dimmed()
    };
    println!("{} {} wallet(s) monitored", marker, live);
}
