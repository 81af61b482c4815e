//! CLI error type.

use std::fmt;

use cyclepoll::config::ConfigError;
use cyclepoll::fetch::FetchError;
use cyclepoll::scheduler::SchedulerError;

/// Errors surfaced to the command line.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments or configuration.
    Config(String),
    /// Reading an input file failed.
    Io(std::io::Error),
    /// The scheduler rejected its configuration.
    Scheduler(SchedulerError),
    /// A fetch failed.
    Fetch(FetchError),
    /// The async runtime could not be started.
    Runtime(String),
}

impl CliError {
    /// Prints the error and exits with a non-zero status.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(1);
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Io(e) => write!(f, "I/O error: {}", e),
            CliError::Scheduler(e) => write!(f, "Scheduler error: {}", e),
            CliError::Fetch(e) => write!(f, "Fetch failed: {}", e),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Io(e) => Some(e),
            CliError::Scheduler(e) => Some(e),
            CliError::Fetch(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<SchedulerError> for CliError {
    fn from(e: SchedulerError) -> Self {
        CliError::Scheduler(e)
    }
}

impl From<FetchError> for CliError {
    fn from(e: FetchError) -> Self {
        CliError::Fetch(e)
    }
}
