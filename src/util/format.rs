/// Display formatting for volumes, price changes and token amounts

/// One-decimal scaling used for unit-suffixed volumes: a single decimal below
/// 10, whole numbers from 10 up.
fn scaled(n: f64, unit: &str) -> String {
    if n < 10.0 {
        format!("{:.1}{}", n, unit)
    } else {
        format!("{}{}", n.round() as i64, unit)
    }
}

/// Normalizes a raw volume into a unit-suffixed display string (K/M/B).
///
/// Sub-thousand values keep magnitude-based precision instead of a suffix:
/// 3 decimals below 1, 2 below 10, 1 below 100, whole numbers otherwise.
pub fn format_volume(volume: f64) -> String {
    if volume >= 1_000_000_000.0 {
        return scaled(volume / 1_000_000_000.0, "B");
    }
    if volume >= 1_000_000.0 {
        return scaled(volume / 1_000_000.0, "M");
    }
    if volume >= 1_000.0 {
        return scaled(volume / 1_000.0, "K");
    }

    if volume < 1.0 {
        format!("{:.3}", volume)
    } else if volume < 10.0 {
        format!("{:.2}", volume)
    } else if volume < 100.0 {
        format!("{:.1}", volume)
    } else {
        format!("{}", volume.round() as i64)
    }
}

/// Inverse of [`format_volume`]: a trailing K/M/B (case-insensitive)
/// multiplies the numeric prefix by 1e3/1e6/1e9; no suffix means the value
/// is taken as-is.
pub fn parse_volume(text: &str) -> f64 {
    let trimmed = text.trim();
    let (prefix, multiplier) = match trimmed.chars().last() {
        Some(c) if c.eq_ignore_ascii_case(&'k') => (&trimmed[..trimmed.len() - 1], 1_000.0),
        Some(c) if c.eq_ignore_ascii_case(&'m') => (&trimmed[..trimmed.len() - 1], 1_000_000.0),
        Some(c) if c.eq_ignore_ascii_case(&'b') => (&trimmed[..trimmed.len() - 1], 1_000_000_000.0),
        _ => (trimmed, 1.0),
    };
    prefix.parse::<f64>().unwrap_or(0.0) * multiplier
}

/// Percentage change of a candle, `(close - open) / open * 100`.
pub fn percent_change(open: f64, close: f64) -> f64 {
    if open == 0.0 {
        return 0.0;
    }
    (close - open) / open * 100.0
}

/// Formats a percentage delta, escalating precision as magnitude shrinks:
/// 2 decimals normally, 6 below 0.001.
pub fn format_change(change: f64) -> String {
    let prefix = if change > 0.0 { "+" } else { "" };
    if change != 0.0 && change.abs() < 0.001 {
        format!("{}{:.6}%", prefix, change)
    } else {
        format!("{}{:.2}%", prefix, change)
    }
}

/// Formats a token amount with magnitude-dependent precision: 9 decimals
/// below 0.001, 4 below 1, 2 otherwise.
pub fn format_token_amount(amount: f64) -> String {
    let magnitude = amount.abs();
    if magnitude < 0.001 {
        format!("{:.9}", amount)
    } else if magnitude < 1.0 {
        format!("{:.4}", amount)
    } else {
        format!("{:.2}", amount)
    }
}

/// Shortens a wallet address to its first and last four characters.
pub fn abbreviate_address(address: &str) -> String {
    if address.len() <= 8 {
        return address.to_string();
    }
    format!("{}...{}", &address[..4], &address[address.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_unit_suffixes() {
        assert_eq!(format_volume(7_800_000_000.0), "7.8B");
        assert_eq!(format_volume(2_300_000.0), "2.3M");
        assert_eq!(format_volume(1_500.0), "1.5K");
        assert_eq!(format_volume(42_000_000.0), "42M");
    }

    #[test]
    fn volume_sub_thousand_precision() {
        assert_eq!(format_volume(0.5), "0.500");
        assert_eq!(format_volume(4.2), "4.20");
        assert_eq!(format_volume(42.0), "42.0");
        assert_eq!(format_volume(420.4), "420");
    }

    #[test]
    fn volume_round_trip() {
        for value in [0.5_f64, 42.0, 1_500.0, 2_300_000.0, 7_800_000_000.0] {
            let recovered = parse_volume(&format_volume(value));
            // Formatting keeps one decimal of the scaled value, so allow the
            // corresponding relative tolerance.
            let tolerance = (value * 0.06).max(0.005);
            assert!(
                (recovered - value).abs() <= tolerance,
                "{} -> {} -> {}",
                value,
                format_volume(value),
                recovered
            );
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(parse_volume("1.5k"), 1_500.0);
        assert_eq!(parse_volume("1.5K"), 1_500.0);
        assert_eq!(parse_volume("2m"), 2_000_000.0);
        assert_eq!(parse_volume("3B"), 3_000_000_000.0);
        assert_eq!(parse_volume("17.25"), 17.25);
    }

    #[test]
    fn change_precision_escalates() {
        assert_eq!(format_change(2.345), "+2.35%");
        assert_eq!(format_change(-1.0), "-1.00%");
        assert_eq!(format_change(0.000123), "+0.000123%");
        assert_eq!(format_change(0.0), "0.00%");
    }

    #[test]
    fn token_amount_precision() {
        assert_eq!(format_token_amount(0.000125), "0.000125000");
        assert_eq!(format_token_amount(0.5), "0.5000");
        assert_eq!(format_token_amount(123.456), "123.46");
        assert_eq!(format_token_amount(-0.25), "-0.2500");
    }

    #[test]
    fn address_abbreviation() {
        assert_eq!(
            abbreviate_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"),
            "EPjF...Dt1v"
        );
        assert_eq!(abbreviate_address("short"), "short");
    }
}
