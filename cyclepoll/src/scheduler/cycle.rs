//! Balanced cycle scheduler.
//!
//! The [`BalancedScheduler`] spreads subjects over a repeating cycle of
//! buckets and walks that cycle in real time:
//! - `add` places a subject in the bucket chosen by its [`Balancer`]
//! - every `frequency` the tick loop emits the next bucket's membership
//! - the cycle wraps to bucket 0 after `cycle_size - 1`
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     BalancedScheduler                        │
//! │                                                              │
//! │  add(key) ──► Balancer ──► bucket ──► CycleSchedule          │
//! │                                          ▲                   │
//! │  tick loop:                              │ pick(m)           │
//! │    interval ──► m ──────────────────────┘                    │
//! │                 │                                            │
//! │                 ▼                                            │
//! │    RealTimeTick { minute: m, subjects } ──► mpsc (cap 1)     │
//! │                 │                                            │
//! │                 ▼                                            │
//! │    TickObserver::on_tick, m = (m + 1) % cycle_size           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The output channel holds a single tick, so a slow consumer delays the
//! ticker instead of letting ticks pile up.
//!
//! # Example
//!
//! ```ignore
//! use cyclepoll::scheduler::{BalancedScheduler, SchedulerConfig};
//!
//! let (scheduler, mut ticks) = BalancedScheduler::new(SchedulerConfig::default())?;
//! scheduler.add("141981764");
//! scheduler.start();
//!
//! while let Some(tick) = ticks.recv().await {
//!     for subject in tick.subjects {
//!         // poll subject
//!     }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::balance::{BalanceKind, Balancer, Minute};
use super::error::SchedulerError;
use super::observer::{NoopObserver, TickObserver};
use super::schedule::{CycleSchedule, ScheduleSnapshot};

// =============================================================================
// Configuration
// =============================================================================

/// Default number of buckets per cycle.
pub const DEFAULT_CYCLE_SIZE: u32 = 60;

/// Default tick interval (one minute, matching per-minute API rate windows).
pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60);

/// Capacity of the tick channel. One slot makes delivery blocking.
const TICK_CHANNEL_CAPACITY: usize = 1;

/// Configuration for a [`BalancedScheduler`].
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Requested buckets per cycle.
    pub cycle_size: u32,

    /// Expected number of subjects; 0 means unknown.
    ///
    /// Used to presize storage, and shrinks the cycle when smaller than
    /// `cycle_size` so small populations keep roughly one subject per bucket.
    pub estimated_subjects: usize,

    /// Time between ticks.
    pub frequency: Duration,

    /// Balance strategy.
    pub strategy: BalanceKind,

    /// Appended to each key before it is balanced.
    pub salt: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_size: DEFAULT_CYCLE_SIZE,
            estimated_subjects: 0,
            frequency: DEFAULT_FREQUENCY,
            strategy: BalanceKind::default(),
            salt: None,
        }
    }
}

impl SchedulerConfig {
    /// Set the requested cycle size.
    pub fn with_cycle_size(mut self, cycle_size: u32) -> Self {
        self.cycle_size = cycle_size;
        self
    }

    /// Set the estimated subject count.
    pub fn with_estimated_subjects(mut self, estimated: usize) -> Self {
        self.estimated_subjects = estimated;
        self
    }

    /// Set the tick interval.
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the balance strategy.
    pub fn with_strategy(mut self, strategy: BalanceKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the key salt.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Cycle size after shrinking to the estimated population.
    pub fn effective_cycle_size(&self) -> u32 {
        match u32::try_from(self.estimated_subjects) {
            Ok(estimated) if estimated > 0 && estimated < self.cycle_size => estimated,
            _ => self.cycle_size,
        }
    }
}

// =============================================================================
// Ticks
// =============================================================================

/// A bucket reached by the tick loop, with a copy of its membership.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RealTimeTick {
    /// Bucket just reached.
    pub minute: Minute,
    /// Subjects scheduled in that bucket when the tick fired.
    pub subjects: Vec<String>,
}

// =============================================================================
// Scheduler
// =============================================================================

struct RunningLoop {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Spreads subjects over a cycle of buckets and emits one bucket per tick.
///
/// `add`, `remove` and `pick` are synchronous and safe to call from any
/// thread while the tick loop runs. `start` and `stop` may be called from
/// different tasks; `stop` is idempotent.
pub struct BalancedScheduler {
    cycle_size: u32,
    frequency: Duration,
    balancer: Balancer,
    schedule: Arc<CycleSchedule>,
    observer: Arc<dyn TickObserver>,
    tick_tx: mpsc::Sender<RealTimeTick>,
    running: Mutex<Option<RunningLoop>>,
}

impl std::fmt::Debug for BalancedScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalancedScheduler")
            .field("cycle_size", &self.cycle_size)
            .field("frequency", &self.frequency)
            .field("balancer", &self.balancer)
            .field("subjects", &self.schedule.len())
            .finish_non_exhaustive()
    }
}

impl BalancedScheduler {
    /// Creates a stopped scheduler and the receiver for its ticks.
    ///
    /// # Errors
    ///
    /// Returns an error if the cycle size or the frequency is zero.
    pub fn new(
        config: SchedulerConfig,
    ) -> Result<(Self, mpsc::Receiver<RealTimeTick>), SchedulerError> {
        if config.cycle_size == 0 {
            return Err(SchedulerError::ZeroCycleSize);
        }
        if config.frequency.is_zero() {
            return Err(SchedulerError::ZeroFrequency);
        }

        let cycle_size = config.effective_cycle_size();
        if cycle_size != config.cycle_size {
            info!(
                requested = config.cycle_size,
                effective = cycle_size,
                estimated_subjects = config.estimated_subjects,
                "Shrinking cycle to estimated subject count"
            );
        }

        let (tick_tx, tick_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
        let scheduler = Self {
            cycle_size,
            frequency: config.frequency,
            balancer: Balancer::from_kind(config.strategy, cycle_size, config.salt),
            schedule: Arc::new(CycleSchedule::with_capacity(
                cycle_size as usize,
                config.estimated_subjects,
            )),
            observer: Arc::new(NoopObserver),
            tick_tx,
            running: Mutex::new(None),
        };

        Ok((scheduler, tick_rx))
    }

    /// Replaces the tick observer. Takes effect on the next `start`.
    pub fn with_observer(mut self, observer: Arc<dyn TickObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Bucket the balancer picks for `key`.
    ///
    /// For round-robin this consumes a rotation slot.
    pub fn balanced_min(&self, key: &str) -> Minute {
        self.balancer.key(key)
    }

    /// Schedules `key`. Returns `false` if it was already scheduled.
    ///
    /// The bucket is chosen under the schedule lock, so a key added from
    /// several threads at once takes a single round-robin slot.
    pub fn add(&self, key: &str) -> bool {
        match self.schedule.add_with(key, || self.balanced_min(key)) {
            Some(minute) => {
                debug!(key, minute, "Subject scheduled");
                true
            }
            None => false,
        }
    }

    /// Unschedules `key`. Returns `false` if it was not scheduled.
    ///
    /// With the hash strategy the bucket is recomputed from the key. Round-robin
    /// has no stable mapping, so the bucket comes from the reverse index.
    pub fn remove(&self, key: &str) -> bool {
        let minute = if self.balancer.is_deterministic() {
            Some(self.balanced_min(key))
        } else {
            self.schedule.bucket_of(key)
        };
        let removed = minute.is_some_and(|m| self.schedule.remove(m, key));
        if removed {
            debug!(key, "Subject unscheduled");
        }
        removed
    }

    /// Copy of the subjects in `minute`.
    pub fn pick(&self, minute: Minute) -> Vec<String> {
        self.schedule.pick(minute)
    }

    /// Bucket `key` is scheduled in.
    pub fn bucket_of(&self, key: &str) -> Option<Minute> {
        self.schedule.bucket_of(key)
    }

    /// Number of scheduled subjects.
    pub fn len(&self) -> usize {
        self.schedule.len()
    }

    /// Returns true if nothing is scheduled.
    pub fn is_empty(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Buckets per cycle, after any shrinking.
    pub fn cycle_size(&self) -> u32 {
        self.cycle_size
    }

    /// Time between ticks.
    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    /// Consistent copy of the membership maps.
    pub fn snapshot(&self) -> ScheduleSnapshot {
        self.schedule.snapshot()
    }

    /// Whether the tick loop is running.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Starts the tick loop at bucket 0.
    ///
    /// Must be called from within a Tokio runtime. Returns `false` if the
    /// loop is already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
        {
            return false;
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_ticks(
            self.cycle_size,
            self.frequency,
            Arc::clone(&self.schedule),
            Arc::clone(&self.observer),
            self.tick_tx.clone(),
            shutdown.clone(),
        ));
        *running = Some(RunningLoop { shutdown, handle });

        info!(
            cycle_size = self.cycle_size,
            frequency_ms = self.frequency.as_millis() as u64,
            subjects = self.schedule.len(),
            "Scheduler started"
        );
        true
    }

    /// Stops the tick loop and waits for it to exit.
    ///
    /// A no-op when the loop is not running. A tick already delivered to the
    /// channel stays there.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(RunningLoop { shutdown, handle }) = running else {
            return;
        };
        shutdown.cancel();
        let _ = handle.await;
        info!("Scheduler stopped");
    }
}

impl Drop for BalancedScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.shutdown.cancel();
        }
    }
}

/// Tick loop: one bucket per interval until cancelled or the receiver is dropped.
async fn run_ticks(
    cycle_size: u32,
    frequency: Duration,
    schedule: Arc<CycleSchedule>,
    observer: Arc<dyn TickObserver>,
    tick_tx: mpsc::Sender<RealTimeTick>,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + frequency, frequency);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut minute: Minute = 0;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let tick = RealTimeTick {
            minute,
            subjects: schedule.pick(minute),
        };
        debug!(minute, subjects = tick.subjects.len(), "Tick");

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = tick_tx.send(tick.clone()) => {
                if sent.is_err() {
                    debug!("Tick receiver dropped, ending tick loop");
                    break;
                }
            }
        }

        observer.on_tick(&tick);
        minute = (minute + 1) % cycle_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config(cycle_size: u32) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_cycle_size(cycle_size)
            .with_frequency(Duration::from_millis(10))
    }

    #[derive(Default)]
    struct CountingObserver {
        ticks: AtomicUsize,
    }

    impl TickObserver for CountingObserver {
        fn on_tick(&self, _tick: &RealTimeTick) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.cycle_size, DEFAULT_CYCLE_SIZE);
        assert_eq!(config.frequency, DEFAULT_FREQUENCY);
        assert_eq!(config.strategy, BalanceKind::RoundRobin);
        assert_eq!(config.salt, None);
    }

    #[test]
    fn test_zero_cycle_size_rejected() {
        let result = BalancedScheduler::new(SchedulerConfig::default().with_cycle_size(0));
        assert_eq!(result.err(), Some(SchedulerError::ZeroCycleSize));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let result =
            BalancedScheduler::new(SchedulerConfig::default().with_frequency(Duration::ZERO));
        assert_eq!(result.err(), Some(SchedulerError::ZeroFrequency));
    }

    #[test]
    fn test_cycle_shrinks_to_estimated_subjects() {
        let config = SchedulerConfig::default()
            .with_cycle_size(60)
            .with_estimated_subjects(12);
        let (scheduler, _rx) = BalancedScheduler::new(config).unwrap();
        assert_eq!(scheduler.cycle_size(), 12);

        let config = SchedulerConfig::default()
            .with_cycle_size(60)
            .with_estimated_subjects(500);
        let (scheduler, _rx) = BalancedScheduler::new(config).unwrap();
        assert_eq!(scheduler.cycle_size(), 60);
    }

    #[test]
    fn test_round_robin_distribution_is_exact() {
        let (scheduler, _rx) = BalancedScheduler::new(fast_config(10)).unwrap();
        for i in 0..500 {
            assert!(scheduler.add(&format!("subject-{}", i)));
        }
        for minute in 0..10 {
            assert_eq!(scheduler.pick(minute).len(), 50, "bucket {}", minute);
        }
    }

    #[test]
    fn test_add_twice_keeps_bucket() {
        let (scheduler, _rx) = BalancedScheduler::new(fast_config(4)).unwrap();
        assert!(scheduler.add("a"));
        let bucket = scheduler.bucket_of("a");
        assert!(!scheduler.add("a"));
        assert_eq!(scheduler.bucket_of("a"), bucket);
        assert_eq!(scheduler.len(), 1);
        assert!(scheduler.snapshot().is_consistent());
    }

    #[test]
    fn test_remove_with_round_robin_uses_index() {
        let (scheduler, _rx) = BalancedScheduler::new(fast_config(4)).unwrap();
        scheduler.add("a");
        scheduler.add("b");
        assert!(scheduler.remove("a"));
        assert!(!scheduler.remove("a"));
        assert_eq!(scheduler.pick(0), Vec::<String>::new());
        assert_eq!(scheduler.pick(1), vec!["b"]);
    }

    #[test]
    fn test_remove_with_hash_and_salt() {
        let config = fast_config(16)
            .with_strategy(BalanceKind::Hash)
            .with_salt("s1");
        let (scheduler, _rx) = BalancedScheduler::new(config).unwrap();
        for i in 0..40 {
            scheduler.add(&format!("user-{}", i));
        }
        for i in 0..40 {
            assert!(scheduler.remove(&format!("user-{}", i)));
        }
        assert!(scheduler.is_empty());
        assert!(scheduler.snapshot().is_consistent());
    }

    #[test]
    fn test_salted_hash_is_stable_across_instances() {
        let config = fast_config(32)
            .with_strategy(BalanceKind::Hash)
            .with_salt("pepper");
        let (a, _rx_a) = BalancedScheduler::new(config.clone()).unwrap();
        let (b, _rx_b) = BalancedScheduler::new(config).unwrap();
        for i in 0..20 {
            let key = format!("channel-{}", i);
            assert_eq!(a.balanced_min(&key), b.balanced_min(&key));
        }
    }

    #[test]
    fn test_salt_is_applied_by_the_balancer() {
        let config = fast_config(32)
            .with_strategy(BalanceKind::Hash)
            .with_salt("pepper");
        let (scheduler, _rx) = BalancedScheduler::new(config).unwrap();
        let reference = Balancer::hash_salted(32, "pepper");
        for i in 0..20 {
            let key = format!("channel-{}", i);
            scheduler.add(&key);
            assert_eq!(scheduler.bucket_of(&key), Some(reference.key(&key)));
        }
    }

    #[test]
    fn test_concurrent_duplicate_adds_take_one_slot() {
        let (scheduler, _rx) = BalancedScheduler::new(fast_config(10)).unwrap();
        let scheduler = Arc::new(scheduler);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        scheduler.add(&format!("user-{}", i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(scheduler.len(), 500);
        for minute in 0..10 {
            assert_eq!(scheduler.pick(minute).len(), 50, "bucket {}", minute);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop_restart() {
        let observer = Arc::new(CountingObserver::default());
        let (scheduler, mut rx) = BalancedScheduler::new(fast_config(3)).unwrap();
        let scheduler = scheduler.with_observer(observer.clone());
        scheduler.add("a");

        assert!(!scheduler.is_running());
        assert!(scheduler.start());
        assert!(!scheduler.start(), "second start must be a no-op");
        assert!(scheduler.is_running());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.minute, 0);
        assert_eq!(first.subjects, vec!["a"]);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.minute, 1);

        scheduler.stop().await;
        scheduler.stop().await;
        assert!(!scheduler.is_running());
        while rx.try_recv().is_ok() {}

        assert!(scheduler.start());
        let resumed = rx.recv().await.unwrap();
        assert_eq!(resumed.minute, 0);
        scheduler.stop().await;

        assert!(observer.ticks.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_stop_before_any_tick() {
        let (scheduler, _rx) = BalancedScheduler::new(
            SchedulerConfig::default().with_frequency(Duration::from_secs(3600)),
        )
        .unwrap();
        scheduler.stop().await;
        assert!(scheduler.start());
        scheduler.stop().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_loop_ends_when_receiver_dropped() {
        let (scheduler, rx) = BalancedScheduler::new(fast_config(2)).unwrap();
        drop(rx);
        scheduler.start();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(!scheduler.is_running());
    }
}
