//! Common types and utilities shared across CLI commands.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use cyclepoll::config::PollerConfig;
use cyclepoll::scheduler::BalanceKind;

use crate::error::CliError;

/// Balancing strategy selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum StrategyArg {
    /// Rotate through buckets in insertion order
    RoundRobin,
    /// Murmur3 hash of the key, stable across restarts
    Hash,
}

impl From<StrategyArg> for BalanceKind {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::RoundRobin => BalanceKind::RoundRobin,
            StrategyArg::Hash => BalanceKind::Hash,
        }
    }
}

/// Loads the config file if given, otherwise the defaults.
pub fn load_config(path: Option<&Path>) -> Result<PollerConfig, CliError> {
    match path {
        Some(path) => Ok(PollerConfig::from_file(path)?),
        None => Ok(PollerConfig::default()),
    }
}

/// Reads subject keys, one per line.
///
/// Blank lines and lines starting with `#` are skipped; duplicates keep
/// their first position.
pub fn read_subjects(path: &Path) -> Result<Vec<String>, CliError> {
    let text = std::fs::read_to_string(path)?;
    let mut seen = std::collections::HashSet::new();
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect())
}

/// Splits a `name=value` argument.
pub fn parse_param(raw: &str) -> Result<(String, String), CliError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(CliError::Config(format!(
            "Invalid parameter '{}', expected name=value",
            raw
        ))),
    }
}

/// Parses an RFC 3339 timestamp.
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, CliError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CliError::Config(format!("Invalid timestamp '{}': {}", raw, e)))
}

/// Builds the multi-threaded runtime the async commands run on.
pub fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_strategy_conversion() {
        assert_eq!(BalanceKind::from(StrategyArg::RoundRobin), BalanceKind::RoundRobin);
        assert_eq!(BalanceKind::from(StrategyArg::Hash), BalanceKind::Hash);
    }

    #[test]
    fn test_read_subjects() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# streamers").unwrap();
        writeln!(file, "141981764").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  12826  ").unwrap();
        writeln!(file, "141981764").unwrap();
        file.flush().unwrap();

        let subjects = read_subjects(file.path()).unwrap();
        assert_eq!(subjects, vec!["141981764", "12826"]);
    }

    #[test]
    fn test_read_subjects_missing_file() {
        let result = read_subjects(Path::new("/nonexistent/subjects.txt"));
        assert!(matches!(result, Err(CliError::Io(_))));
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("first=100").unwrap(),
            ("first".to_string(), "100".to_string())
        );
        assert_eq!(
            parse_param("game_id=").unwrap(),
            ("game_id".to_string(), String::new())
        );
        assert!(parse_param("first").is_err());
        assert!(parse_param("=100").is_err());
    }

    #[test]
    fn test_parse_time() {
        let t = parse_time("2024-03-01T02:00:00+02:00").unwrap();
        assert_eq!(t.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        assert_eq!(load_config(None).unwrap(), PollerConfig::default());
    }
}
