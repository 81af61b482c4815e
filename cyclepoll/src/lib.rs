//! cyclepoll - balanced polling of rate-limited content APIs
//!
//! This library spreads many independent subjects (channels, user accounts)
//! across a repeating cycle of time buckets so each tick stays within the
//! API's request budget, and fetches their data resiliently:
//!
//! - [`scheduler`]: bucket assignment, membership, real-time ticks
//! - [`fetch`]: retries, cursor pagination, adaptive time-window bisection
//! - [`stats`]: rolling average used to decide when a scan can stop
//! - [`config`]: INI-backed configuration for all of the above
//!
//! # Example
//!
//! ```ignore
//! use cyclepoll::config::PollerConfig;
//! use cyclepoll::scheduler::BalancedScheduler;
//!
//! let config = PollerConfig::from_file("cyclepoll.ini")?;
//! let (scheduler, mut ticks) = BalancedScheduler::new(config.scheduler)?;
//! for subject in active_subjects {
//!     scheduler.add(&subject);
//! }
//! scheduler.start();
//!
//! while let Some(tick) = ticks.recv().await {
//!     for subject in tick.subjects {
//!         tokio::spawn(poll(subject));
//!     }
//! }
//! ```

pub mod config;
pub mod fetch;
pub mod scheduler;
pub mod stats;
