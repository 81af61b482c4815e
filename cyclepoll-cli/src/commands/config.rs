//! Configuration inspection commands.
//!
//! `config show` prints every setting after the file's overrides are
//! applied, in the same `[section] key = value` layout the file uses.

use std::path::Path;

use clap::Subcommand;
use cyclepoll::config::PollerConfig;
use cyclepoll::fetch::RetryPolicy;

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the configuration file and scheduler settings
    Check,
}

/// Run a config subcommand.
pub fn run(path: Option<&Path>, command: ConfigCommands) -> Result<(), CliError> {
    let config = load_config(path)?;
    match command {
        ConfigCommands::Show => {
            for (section, entries) in settings(&config) {
                println!("[{}]", section);
                for (key, value) in entries {
                    println!("  {} = {}", key, value);
                }
                println!();
            }
            Ok(())
        }
        ConfigCommands::Check => {
            cyclepoll::scheduler::BalancedScheduler::new(config.scheduler.clone())?;
            println!(
                "Configuration OK ({} buckets every {:?})",
                config.scheduler.effective_cycle_size(),
                config.scheduler.frequency
            );
            Ok(())
        }
    }
}

type Section = (&'static str, Vec<(&'static str, String)>);

/// Flattens the configuration into displayable sections.
fn settings(config: &PollerConfig) -> Vec<Section> {
    let scheduler = &config.scheduler;
    let fetch = &config.fetch;
    let adaptive = &config.adaptive;

    let (backoff, retry_delay) = match &fetch.retry {
        RetryPolicy::None => ("none", String::from("-")),
        RetryPolicy::Fixed { delay, .. } => ("fixed", delay.as_millis().to_string()),
        RetryPolicy::ExponentialBackoff { initial_delay, .. } => {
            ("exponential", initial_delay.as_millis().to_string())
        }
    };

    vec![
        (
            "scheduler",
            vec![
                ("cycle_size", scheduler.cycle_size.to_string()),
                ("estimated_subjects", scheduler.estimated_subjects.to_string()),
                ("frequency_ms", scheduler.frequency.as_millis().to_string()),
                ("strategy", scheduler.strategy.to_string()),
                (
                    "salt",
                    scheduler.salt.clone().unwrap_or_else(|| "(not set)".to_string()),
                ),
            ],
        ),
        (
            "fetch",
            vec![
                ("max_attempts", fetch.retry.max_attempts().to_string()),
                ("retry_delay_ms", retry_delay),
                ("backoff", backoff.to_string()),
                (
                    "rate_limit_margin_ms",
                    fetch.rate_limit_margin.as_millis().to_string(),
                ),
                ("rate_limit_reset_header", fetch.rate_limit_reset_header.clone()),
                ("max_body_bytes", fetch.max_body_bytes.to_string()),
                ("timeout_secs", fetch.timeout.as_secs().to_string()),
            ],
        ),
        (
            "adaptive",
            vec![
                ("view_threshold", adaptive.view_threshold.to_string()),
                ("window_size", adaptive.window_size.to_string()),
                ("max_depth", adaptive.max_depth.to_string()),
            ],
        ),
    ]
}
