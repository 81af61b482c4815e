//! Balanced cycle scheduling of polled subjects.
//!
//! Subjects (broadcaster or user ids) are spread across a repeating cycle of
//! buckets so that each tick only polls a bounded slice of the population.
//!
//! # Components
//!
//! - [`Balancer`]: maps a key to a bucket (round-robin or hash)
//! - [`CycleSchedule`]: bucket membership plus reverse index, one lock
//! - [`BalancedScheduler`]: ties both to a real-time tick loop
//! - [`TickObserver`]: optional hook called after each tick

mod balance;
mod cycle;
mod error;
mod observer;
mod schedule;

pub use balance::{BalanceKind, Balancer, Minute};
pub use cycle::{
    BalancedScheduler, RealTimeTick, SchedulerConfig, DEFAULT_CYCLE_SIZE, DEFAULT_FREQUENCY,
};
pub use error::SchedulerError;
pub use observer::{LoggingObserver, NoopObserver, TickObserver};
pub use schedule::{CycleSchedule, ScheduleSnapshot};
