//! Schedule command - spread subjects over the cycle and follow its ticks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cyclepoll::scheduler::{BalancedScheduler, LoggingObserver, SchedulerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::common::{load_config, read_subjects, runtime, StrategyArg};
use crate::error::CliError;

/// Arguments for the schedule command.
pub struct ScheduleArgs {
    pub config: Option<PathBuf>,
    pub subjects: PathBuf,
    pub cycle_size: Option<u32>,
    pub estimated_subjects: Option<usize>,
    pub frequency_ms: Option<u64>,
    pub strategy: Option<StrategyArg>,
    pub salt: Option<String>,
    pub ticks: Option<usize>,
    pub dry_run: bool,
}

impl ScheduleArgs {
    /// Applies command-line overrides on top of the file configuration.
    fn scheduler_config(&self, mut config: SchedulerConfig) -> SchedulerConfig {
        if let Some(cycle_size) = self.cycle_size {
            config.cycle_size = cycle_size;
        }
        if let Some(estimated) = self.estimated_subjects {
            config.estimated_subjects = estimated;
        }
        if let Some(ms) = self.frequency_ms {
            config.frequency = Duration::from_millis(ms);
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy.into();
        }
        if let Some(salt) = &self.salt {
            config.salt = Some(salt.clone());
        }
        config
    }
}

/// Run the schedule command.
pub fn run(args: ScheduleArgs) -> Result<(), CliError> {
    let file_config = load_config(args.config.as_deref())?;
    let config = args.scheduler_config(file_config.scheduler);
    let subjects = read_subjects(&args.subjects)?;

    let (scheduler, mut ticks) = BalancedScheduler::new(config)?;
    let scheduler = scheduler.with_observer(Arc::new(LoggingObserver));
    for subject in &subjects {
        scheduler.add(subject);
    }

    println!("Cycle:     {} buckets", scheduler.cycle_size());
    println!("Frequency: {:?}", scheduler.frequency());
    println!("Subjects:  {}", scheduler.len());
    println!();

    if args.dry_run {
        print_layout(&scheduler);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        signal.cancel();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    println!("Press Ctrl+C to stop");
    println!();

    let rt = runtime()?;
    rt.block_on(async {
        scheduler.start();
        let mut seen = 0usize;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                tick = ticks.recv() => {
                    let Some(tick) = tick else { break };
                    println!(
                        "[{:>3}] {} subject(s){}",
                        tick.minute,
                        tick.subjects.len(),
                        preview(&tick.subjects)
                    );
                    seen += 1;
                    if args.ticks.is_some_and(|limit| seen >= limit) {
                        break;
                    }
                }
            }
        }

        scheduler.stop().await;
        info!(ticks = seen, "Scheduler stopped");
    });

    Ok(())
}

/// Prints every bucket with its member count.
fn print_layout(scheduler: &BalancedScheduler) {
    let snapshot = scheduler.snapshot();
    for minute in 0..scheduler.cycle_size() {
        let members = snapshot.buckets.get(&minute).cloned().unwrap_or_default();
        println!("[{:>3}] {} subject(s){}", minute, members.len(), preview(&members));
    }
}

const PREVIEW_LIMIT: usize = 5;

fn preview(subjects: &[String]) -> String {
    if subjects.is_empty() {
        return String::new();
    }
    let shown: Vec<&str> = subjects.iter().take(PREVIEW_LIMIT).map(String::as_str).collect();
    if subjects.len() > PREVIEW_LIMIT {
        format!(": {}, ...", shown.join(", "))
    } else {
        format!(": {}", shown.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyclepoll::scheduler::BalanceKind;

    fn args() -> ScheduleArgs {
        ScheduleArgs {
            config: None,
            subjects: PathBuf::from("subjects.txt"),
            cycle_size: None,
            estimated_subjects: None,
            frequency_ms: None,
            strategy: None,
            salt: None,
            ticks: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_no_overrides_keeps_file_config() {
        let base = SchedulerConfig::default().with_cycle_size(12);
        assert_eq!(args().scheduler_config(base.clone()), base);
    }

    #[test]
    fn test_overrides_apply() {
        let args = ScheduleArgs {
            cycle_size: Some(5),
            frequency_ms: Some(250),
            strategy: Some(StrategyArg::Hash),
            salt: Some("clips".to_string()),
            ..args()
        };
        let config = args.scheduler_config(SchedulerConfig::default());
        assert_eq!(config.cycle_size, 5);
        assert_eq!(config.frequency, Duration::from_millis(250));
        assert_eq!(config.strategy, BalanceKind::Hash);
        assert_eq!(config.salt.as_deref(), Some("clips"));
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview(&[]), "");
        let few: Vec<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert_eq!(preview(&few), ": a, b");
        let many: Vec<String> = (0..7).map(|i| i.to_string()).collect();
        assert_eq!(preview(&many), ": 0, 1, 2, 3, 4, ...");
    }
}
