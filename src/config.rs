//! Environment configuration helpers shared by both binaries
//!
//! Every loader takes a lookup function instead of reading `std::env`
//! directly, so configurations can be built from plain maps in tests.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Read a variable from the process environment
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Fetch an optional variable, treating blank values as unset
pub fn optional<F>(lookup: &F, var: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fetch a variable that must be present and non-blank
pub fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, var).ok_or(ConfigError::Missing(var))
}

/// Parse a raw value, attributing failures to `var`
pub fn parse_value<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

/// Fetch and parse an optional variable, falling back to `default`
pub fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match optional(lookup, var) {
        Some(raw) => parse_value(var, &raw),
        None => Ok(default),
    }
}

/// Fetch a duration variable in Go notation (`30s`, `1m30s`, `1.5h`)
pub fn duration_var<F>(lookup: &F, var: &'static str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = required(lookup, var)?;
    parse_duration(&raw).map_err(|e| ConfigError::Invalid {
        var,
        reason: e.to_string(),
    })
}

/// Parse a boolean flag such as `true`, `1`, `yes`, `off`
pub fn parse_flag(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            var,
            reason: format!("expected a boolean, got '{}'", other),
        }),
    }
}

/// Parse a duration written as a sequence of decimal numbers with unit
/// suffixes. Accepted units: `ns`, `us` (`µs`), `ms`, `s`, `m`, `h`.
///
/// The result must be strictly positive.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);

    if body.starts_with('-') {
        return Err(DurationError::NotPositive(input.to_string()));
    }
    if body.is_empty() {
        return Err(DurationError::Empty);
    }

    let mut total_nanos = 0f64;
    let mut rest = body;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() || number == "." {
            return Err(DurationError::InvalidNumber(rest.to_string()));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| DurationError::InvalidNumber(number.to_string()))?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" if body == "0" => 0.0,
            "" => return Err(DurationError::MissingUnit(input.to_string())),
            other => return Err(DurationError::UnknownUnit(other.to_string())),
        };

        total_nanos += value * scale;
        rest = tail;
    }

    if total_nanos >= u64::MAX as f64 {
        return Err(DurationError::Overflow(input.to_string()));
    }

    let nanos = total_nanos.round() as u64;
    if nanos == 0 {
        return Err(DurationError::NotPositive(input.to_string()));
    }

    Ok(Duration::from_nanos(nanos))
}

/// Duration parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid number in duration: {0}")]
    InvalidNumber(String),

    #[error("missing unit in duration: {0}")]
    MissingUnit(String),

    #[error("unknown unit '{0}' in duration")]
    UnknownUnit(String),

    #[error("duration must be positive: {0}")]
    NotPositive(String),

    #[error("duration out of range: {0}")]
    Overflow(String),
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error(
        "no data source configured: set COUNTER_SVC_HOST, or MYSQL_HOST, MYSQL_DATABASE, \
         MYSQL_USER and MYSQL_PASSWORD"
    )]
    NoSource,
}
