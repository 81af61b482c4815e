//! cyclepoll CLI - command-line interface
//!
//! Runs the balanced cycle scheduler over a subject list, or performs a
//! single adaptive fetch against a list endpoint.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::common::StrategyArg;
use commands::config::ConfigCommands;
use commands::fetch::FetchArgs;
use commands::schedule::ScheduleArgs;

#[derive(Parser)]
#[command(name = "cyclepoll")]
#[command(version, about = "Balanced polling of rate-limited content APIs", long_about = None)]
struct Cli {
    /// INI configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spread subjects over the cycle and print each tick's bucket
    Schedule {
        /// File with one subject key per line
        subjects: PathBuf,

        /// Number of buckets in the cycle
        #[arg(long)]
        cycle_size: Option<u32>,

        /// Expected number of subjects; shrinks the cycle when smaller
        #[arg(long)]
        estimated_subjects: Option<usize>,

        /// Tick frequency in milliseconds
        #[arg(long)]
        frequency_ms: Option<u64>,

        /// Balancing strategy
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,

        /// Salt appended to keys before hashing
        #[arg(long)]
        salt: Option<String>,

        /// Exit after this many ticks
        #[arg(long)]
        ticks: Option<usize>,

        /// Only print the bucket layout, do not start ticking
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch every item of a time window, bisecting dense windows
    Fetch {
        /// List endpoint URL
        url: String,

        /// Window start (RFC 3339)
        #[arg(long)]
        start: String,

        /// Window end (RFC 3339)
        #[arg(long)]
        end: String,

        /// Extra query parameter as name=value (repeatable)
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// OAuth bearer token
        #[arg(long)]
        token: Option<String>,

        /// Client-Id header value
        #[arg(long)]
        client_id: Option<String>,

        /// Drop items repeated across sub-window boundaries
        #[arg(long)]
        dedup: bool,

        /// Print items as JSON lines instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cyclepoll={0},cyclepoll_cli={0}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Schedule {
            subjects,
            cycle_size,
            estimated_subjects,
            frequency_ms,
            strategy,
            salt,
            ticks,
            dry_run,
        } => commands::schedule::run(ScheduleArgs {
            config: cli.config,
            subjects,
            cycle_size,
            estimated_subjects,
            frequency_ms,
            strategy,
            salt,
            ticks,
            dry_run,
        }),

        Commands::Fetch {
            url,
            start,
            end,
            params,
            token,
            client_id,
            dedup,
            json,
        } => commands::fetch::run(FetchArgs {
            config: cli.config,
            url,
            start,
            end,
            params,
            token,
            client_id,
            dedup,
            json,
        }),

        Commands::Config { command } => commands::config::run(cli.config.as_deref(), command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
