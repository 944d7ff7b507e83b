use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("empty duration literal")]
    Empty,

    #[error("invalid duration literal '{0}'")]
    Invalid(String),

    #[error("unknown duration unit '{0}' in '{1}'")]
    UnknownUnit(String, String),
}

/// Parses a duration literal of the form `{number}{unit}`, optionally
/// repeated (e.g. `"1h30m"`), where `unit` is one of `ns`, `us`/`µs`, `ms`,
/// `s`, `m`, `h`. Mirrors Go's `time.ParseDuration`, which the upstream
/// daemon uses directly for its `ban`/`aggregate`/`occurrences` duration
/// parameters.
pub fn parse_duration(literal: &str) -> Result<Duration, DurationParseError> {
    if literal.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut total = Duration::ZERO;
    let mut rest = literal;
    let mut consumed_any = false;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(|| DurationParseError::Invalid(literal.to_string()))?;

        if digits_end == 0 {
            return Err(DurationParseError::Invalid(literal.to_string()));
        }

        let number: f64 = rest[..digits_end]
            .parse()
            .map_err(|_| DurationParseError::Invalid(literal.to_string()))?;

        let unit_start = digits_end;
        let unit_end = rest[unit_start..]
            .find(|c: char| c.is_ascii_digit())
            .map(|i| unit_start + i)
            .unwrap_or(rest.len());

        let unit = &rest[unit_start..unit_end];
        let nanos_per_unit: f64 = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1_000.0,
            "ms" => 1_000_000.0,
            "s" => 1_000_000_000.0,
            "m" => 60.0 * 1_000_000_000.0,
            "h" => 3_600.0 * 1_000_000_000.0,
            other => return Err(DurationParseError::UnknownUnit(other.to_string(), literal.to_string())),
        };

        total += Duration::from_nanos((number * nanos_per_unit).round() as u64);
        consumed_any = true;
        rest = &rest[unit_end..];
    }

    if !consumed_any {
        return Err(DurationParseError::Invalid(literal.to_string()));
    }

    Ok(total)
}
