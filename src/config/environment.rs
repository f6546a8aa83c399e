// ABOUTME: Environment variable lookup and parsing helpers for configuration loading
// ABOUTME: Typed parsing of integers, booleans, durations and comma-separated lists
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Environment lookups.
//!
//! Configuration is read through an [`EnvSource`] so tests can feed a map
//! instead of mutating the process environment.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{AppError, AppResult};

/// Source of configuration values keyed by variable name
pub trait EnvSource {
    /// Raw value for `key`, if set
    fn get(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        Self::get(self, key).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn get(&self, key: &str) -> Option<String> {
        Self::get(self, key).map(|value| (*value).to_owned())
    }
}

/// Non-empty trimmed value
pub fn env_opt(source: &dyn EnvSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

/// Value or default
pub fn env_var_or(source: &dyn EnvSource, key: &str, default: &str) -> String {
    env_opt(source, key).unwrap_or_else(|| default.to_owned())
}

/// Parse a value with `FromStr`, falling back to `default` when unset
///
/// # Errors
///
/// Returns a configuration error if the value is set but does not parse.
pub fn env_parse<T: FromStr>(source: &dyn EnvSource, key: &str, default: T) -> AppResult<T> {
    env_opt(source, key).map_or(Ok(default), |raw| {
        raw.parse()
            .map_err(|_| AppError::config(format!("Invalid {key} value: {raw}")))
    })
}

/// Parse a boolean accepting `true/false`, `1/0`, `yes/no`, `on/off`
///
/// # Errors
///
/// Returns a configuration error for any other value.
pub fn env_bool(source: &dyn EnvSource, key: &str, default: bool) -> AppResult<bool> {
    let Some(raw) = env_opt(source, key) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(AppError::config(format!("Invalid {key} value: {raw}"))),
    }
}

/// Parse a duration such as `5s`, `250ms`, `2m`, `1h` or a bare number of seconds
///
/// # Errors
///
/// Returns a configuration error if the value is set but malformed.
pub fn env_duration(source: &dyn EnvSource, key: &str, default: Duration) -> AppResult<Duration> {
    env_opt(source, key).map_or(Ok(default), |raw| {
        parse_duration(&raw).ok_or_else(|| AppError::config(format!("Invalid {key} value: {raw}")))
    })
}

/// Parse a duration literal
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);
    let value: f64 = number.parse().ok()?;
    if value < 0.0 {
        return None;
    }
    let seconds = match unit.trim() {
        "" | "s" | "sec" | "secs" => value,
        "ms" => value / 1000.0,
        "m" | "min" => value * 60.0,
        "h" => value * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(seconds))
}

/// Parse comma-separated values
#[must_use]
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("30"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn test_env_bool_rejects_garbage() {
        let source: HashMap<&str, &str> = HashMap::from([("FLAG", "maybe"), ("ON", "Yes")]);
        assert!(env_bool(&source, "FLAG", false).is_err());
        assert!(env_bool(&source, "ON", false).unwrap());
        assert!(env_bool(&source, "UNSET", true).unwrap());
    }

    #[test]
    fn test_parse_list_trims_and_drops_empty() {
        assert_eq!(
            parse_list(" a, b ,,c "),
            vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]
        );
    }
}
