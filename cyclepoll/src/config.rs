//! Poller configuration and INI loading.
//!
//! `PollerConfig` groups the scheduler, fetch client and adaptive fetcher
//! settings. Each section has sensible defaults; an INI file only needs the
//! keys it wants to override:
//!
//! ```ini
//! [scheduler]
//! cycle_size = 60
//! estimated_subjects = 2500
//! frequency_ms = 60000
//! strategy = hash
//! salt = clips
//!
//! [fetch]
//! max_attempts = 3
//! retry_delay_ms = 1000
//! backoff = fixed
//! rate_limit_margin_ms = 500
//! rate_limit_reset_header = ratelimit-reset
//! max_body_bytes = 4194304
//! timeout_secs = 30
//!
//! [adaptive]
//! view_threshold = 5.0
//! window_size = 10
//! max_depth = 4
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::{Ini, Properties};
use thiserror::Error;

use crate::fetch::{AdaptiveConfig, FetchConfig, RetryPolicy};
use crate::scheduler::{BalanceKind, SchedulerConfig};

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed.
    #[error("failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// The INI text could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    /// A key holds a value of the wrong shape.
    #[error("invalid value {value:?} for [{section}] {key}: {reason}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Complete configuration for a polling process.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PollerConfig {
    /// Cycle scheduler settings.
    pub scheduler: SchedulerConfig,

    /// Fetch client settings.
    pub fetch: FetchConfig,

    /// Adaptive window fetch settings.
    pub adaptive: AdaptiveConfig,
}

impl PollerConfig {
    /// Loads an INI file, keeping defaults for absent keys.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Parses INI text, keeping defaults for absent keys.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("scheduler")) {
            apply_scheduler(&mut config.scheduler, section)?;
        }
        if let Some(section) = ini.section(Some("fetch")) {
            apply_fetch(&mut config.fetch, section)?;
        }
        if let Some(section) = ini.section(Some("adaptive")) {
            apply_adaptive(&mut config.adaptive, section)?;
        }

        Ok(config)
    }
}

fn apply_scheduler(config: &mut SchedulerConfig, props: &Properties) -> Result<(), ConfigError> {
    const SECTION: &str = "scheduler";

    if let Some(v) = parse(props, SECTION, "cycle_size")? {
        config.cycle_size = v;
    }
    if let Some(v) = parse(props, SECTION, "estimated_subjects")? {
        config.estimated_subjects = v;
    }
    if let Some(ms) = parse(props, SECTION, "frequency_ms")? {
        config.frequency = Duration::from_millis(ms);
    }
    if let Some(raw) = props.get("strategy") {
        config.strategy =
            BalanceKind::from_config_str(raw).ok_or_else(|| ConfigError::InvalidValue {
                section: SECTION,
                key: "strategy",
                value: raw.to_string(),
                reason: "expected round_robin or hash".to_string(),
            })?;
    }
    if let Some(raw) = props.get("salt") {
        let salt = raw.trim();
        config.salt = (!salt.is_empty()).then(|| salt.to_string());
    }
    Ok(())
}

fn apply_fetch(config: &mut FetchConfig, props: &Properties) -> Result<(), ConfigError> {
    const SECTION: &str = "fetch";

    let max_attempts = parse(props, SECTION, "max_attempts")?
        .unwrap_or_else(|| config.retry.max_attempts());
    let retry_delay = parse(props, SECTION, "retry_delay_ms")?
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.retry.delay_for_attempt(1).unwrap_or_default());

    config.retry = match props.get("backoff").map(|s| s.trim().to_lowercase()) {
        None => RetryPolicy::fixed(max_attempts, retry_delay),
        Some(kind) if kind == "fixed" => RetryPolicy::fixed(max_attempts, retry_delay),
        Some(kind) if kind == "exponential" => RetryPolicy::exponential(max_attempts, retry_delay),
        Some(kind) => {
            return Err(ConfigError::InvalidValue {
                section: SECTION,
                key: "backoff",
                value: kind,
                reason: "expected fixed or exponential".to_string(),
            })
        }
    };

    if let Some(ms) = parse(props, SECTION, "rate_limit_margin_ms")? {
        config.rate_limit_margin = Duration::from_millis(ms);
    }
    if let Some(v) = parse(props, SECTION, "max_body_bytes")? {
        config.max_body_bytes = v;
    }
    if let Some(secs) = parse(props, SECTION, "timeout_secs")? {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(raw) = props.get("rate_limit_reset_header") {
        config.rate_limit_reset_header = raw.trim().to_ascii_lowercase();
    }
    Ok(())
}

fn apply_adaptive(config: &mut AdaptiveConfig, props: &Properties) -> Result<(), ConfigError> {
    const SECTION: &str = "adaptive";

    if let Some(v) = parse(props, SECTION, "view_threshold")? {
        config.view_threshold = v;
    }
    if let Some(v) = parse(props, SECTION, "window_size")? {
        config.window_size = v;
    }
    if let Some(v) = parse(props, SECTION, "max_depth")? {
        config.max_depth = v;
    }
    Ok(())
}

/// Parses an optional key, reporting the section and key on failure.
fn parse<T>(
    props: &Properties,
    section: &'static str,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    props
        .get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue {
                    section,
                    key,
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}
