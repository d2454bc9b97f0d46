use thiserror::Error;

/// Startup configuration failure. Always fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid setting '{key}': expected {expected}, got '{value}'")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("invalid setting '{key}': must be between {min} and {max}")]
    OutOfRange {
        key: &'static str,
        min: u64,
        max: u64,
    },
    #[error("cannot open log file '{path}': {reason}")]
    LogFile { path: String, reason: String },
}

pub fn require_string(key: &'static str, raw: Option<String>) -> Result<String, ConfigError> {
    match raw {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

pub fn optional_string(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn string_or(raw: Option<String>, default: &str) -> String {
    optional_string(raw).unwrap_or_else(|| default.to_string())
}

pub fn u64_in_range(
    key: &'static str,
    raw: Option<String>,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(text) = optional_string(raw) else {
        return Ok(default);
    };
    let number = text.parse::<u64>().map_err(|_| ConfigError::Invalid {
        key,
        expected: "a non-negative integer",
        value: text.clone(),
    })?;
    if number < min || number > max {
        return Err(ConfigError::OutOfRange { key, min, max });
    }
    Ok(number)
}

pub fn comma_list(raw: Option<String>) -> Vec<String> {
    optional_string(raw)
        .map(|text| {
            text.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
