//! Parses the `<int><unit>` duration strings used throughout configuration
//! (`poll_interval`, `retry_delay`, `abandon_after`, ...).

use std::time::Duration;

use crate::error::ConfigError;

/// Parses strings like `"6h"`, `"30m"`, `"1d"`, `"1w"`, `"1y"`.
///
/// Supported units: `s` seconds, `m` minutes, `h` hours, `d` days, `w` weeks,
/// `y` years (365 days, matching the reference implementation's fixed-year
/// approximation rather than a calendar-aware one).
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    if value.len() < 2 {
        return Err(ConfigError::Validation(format!(
            "invalid duration format: {value}"
        )));
    }

    let (number, unit) = value.split_at(value.len() - 1);
    let amount: u64 = number
        .parse()
        .map_err(|_| ConfigError::Validation(format!("invalid duration value: {number}")))?;

    let seconds = match unit {
        "s" => amount,
        "m" => amount * 60,
        "h" => amount * 60 * 60,
        "d" => amount * 60 * 60 * 24,
        "w" => amount * 60 * 60 * 24 * 7,
        "y" => amount * 60 * 60 * 24 * 365,
        other => {
            return Err(ConfigError::Validation(format!(
                "invalid duration unit: {other}. Use s, m, h, d, w, or y"
            )))
        }
    };

    Ok(Duration::from_secs(seconds))
}
