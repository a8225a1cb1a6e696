// Compact duration strings ("10s", "5m", "6h", "7d") to milliseconds.
// Lenient parse for hot paths; strict parse for config load.

use thiserror::Error;

pub const MS_PER_SECOND: f64 = 1_000.0;
pub const MS_PER_MINUTE: f64 = 60.0 * MS_PER_SECOND;
pub const MS_PER_HOUR: f64 = 60.0 * MS_PER_MINUTE;
pub const MS_PER_DAY: f64 = 24.0 * MS_PER_HOUR;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,
    #[error("invalid number in duration {0:?}")]
    InvalidNumber(String),
    #[error("unknown unit in duration {0:?} (expected s, m, h or d)")]
    UnknownUnit(String),
    #[error("duration {0:?} is not a whole number of milliseconds")]
    Fractional(String),
}

fn unit_ms(unit: char) -> Option<f64> {
    match unit {
        's' => Some(MS_PER_SECOND),
        'm' => Some(MS_PER_MINUTE),
        'h' => Some(MS_PER_HOUR),
        'd' => Some(MS_PER_DAY),
        _ => None,
    }
}

/// Longest leading slice that looks like a decimal number ("1.5" in "1.5h").
fn numeric_prefix(s: &str) -> &str {
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            '+' | '-' if i == 0 => {}
            _ => break,
        }
    }
    &s[..end]
}

/// Never fails: empty or unparsable input is 0, an unknown unit yields the bare number,
/// negative values clamp to 0.
pub fn parse_duration_ms(value: &str) -> f64 {
    let value = value.trim();
    if value.is_empty() {
        return 0.0;
    }
    let number: f64 = numeric_prefix(value).parse().unwrap_or(0.0);
    let ms = match value.chars().last().and_then(unit_ms) {
        Some(factor) => number * factor,
        None => number,
    };
    if ms.is_finite() { ms.max(0.0) } else { 0.0 }
}

/// Validating parse used when loading tier definitions.
pub fn parse_duration_strict(value: &str) -> Result<i64, DurationError> {
    let value = value.trim();
    let Some(unit) = value.chars().last() else {
        return Err(DurationError::Empty);
    };
    let factor = unit_ms(unit).ok_or_else(|| DurationError::UnknownUnit(value.to_string()))?;
    let number_part = &value[..value.len() - unit.len_utf8()];
    if number_part.is_empty()
        || number_part.starts_with('.')
        || !number_part.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(DurationError::InvalidNumber(value.to_string()));
    }
    let number: f64 = number_part
        .parse()
        .map_err(|_| DurationError::InvalidNumber(value.to_string()))?;
    let ms = number * factor;
    if ms.fract() != 0.0 {
        return Err(DurationError::Fractional(value.to_string()));
    }
    Ok(ms as i64)
}
