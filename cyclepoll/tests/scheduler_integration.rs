//! Integration tests for the balanced cycle scheduler.
//!
//! These tests drive the real tick loop on a paused Tokio clock:
//! - tick sequencing and wrap-around
//! - blocking delivery to a slow consumer
//! - hot add/remove while running
//!
//! Run with: `cargo test --test scheduler_integration`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

use cyclepoll::scheduler::{
    BalanceKind, BalancedScheduler, RealTimeTick, SchedulerConfig, TickObserver,
};

// ============================================================================
// Helper Functions
// ============================================================================

fn config(cycle_size: u32, frequency_ms: u64) -> SchedulerConfig {
    SchedulerConfig::default()
        .with_cycle_size(cycle_size)
        .with_frequency(Duration::from_millis(frequency_ms))
}

/// Receives ticks until `deadline`.
async fn collect_until(rx: &mut mpsc::Receiver<RealTimeTick>, deadline: Instant) -> Vec<RealTimeTick> {
    let mut ticks = Vec::new();
    loop {
        tokio::select! {
            Some(tick) = rx.recv() => ticks.push(tick),
            _ = sleep_until(deadline) => break,
        }
    }
    ticks
}

fn minutes(ticks: &[RealTimeTick]) -> Vec<u32> {
    ticks.iter().map(|t| t.minute).collect()
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Three ticks fit in 35ms at a 10ms frequency, in bucket order.
#[tokio::test(start_paused = true)]
async fn test_tick_sequencing() {
    let (scheduler, mut rx) = BalancedScheduler::new(config(3, 10)).unwrap();
    let deadline = Instant::now() + Duration::from_millis(35);

    scheduler.start();
    let ticks = collect_until(&mut rx, deadline).await;
    scheduler.stop().await;

    assert_eq!(minutes(&ticks), vec![0, 1, 2]);
}

/// After the last bucket the cycle wraps to 0.
#[tokio::test(start_paused = true)]
async fn test_cycle_wraps() {
    let (scheduler, mut rx) = BalancedScheduler::new(config(3, 10)).unwrap();
    let deadline = Instant::now() + Duration::from_millis(75);

    scheduler.start();
    let ticks = collect_until(&mut rx, deadline).await;
    scheduler.stop().await;

    assert_eq!(minutes(&ticks), vec![0, 1, 2, 0, 1, 2, 0]);
}

/// Each tick carries the membership of its bucket.
#[tokio::test(start_paused = true)]
async fn test_ticks_carry_bucket_membership() {
    let (scheduler, mut rx) = BalancedScheduler::new(config(2, 10)).unwrap();
    for key in ["a", "b", "c", "d", "e"] {
        scheduler.add(key);
    }

    scheduler.start();
    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    scheduler.stop().await;

    assert_eq!(first.subjects, vec!["a", "c", "e"]);
    assert_eq!(second.subjects, vec!["b", "d"]);
}

/// A consumer that stops reading delays the ticker instead of losing ticks.
#[tokio::test(start_paused = true)]
async fn test_slow_consumer_backpressures_ticker() {
    let (scheduler, mut rx) = BalancedScheduler::new(config(5, 10)).unwrap();
    scheduler.start();

    // Ten intervals pass without anyone reading.
    sleep(Duration::from_millis(100)).await;

    let ticks = vec![
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
        rx.recv().await.unwrap(),
    ];
    scheduler.stop().await;

    assert_eq!(minutes(&ticks), vec![0, 1, 2]);
}

/// Subjects added or removed while running show up from the next tick on,
/// and an already emitted tick is not affected.
#[tokio::test(start_paused = true)]
async fn test_hot_add_and_remove() {
    let cfg = config(1, 10).with_strategy(BalanceKind::Hash);
    let (scheduler, mut rx) = BalancedScheduler::new(cfg).unwrap();
    let scheduler = Arc::new(scheduler);
    scheduler.add("first");
    scheduler.start();

    let tick = rx.recv().await.unwrap();
    assert_eq!(tick.subjects, vec!["first"]);

    let writer = Arc::clone(&scheduler);
    tokio::spawn(async move {
        writer.add("second");
        writer.remove("first");
    })
    .await
    .unwrap();

    assert_eq!(tick.subjects, vec!["first"]);
    let next = loop {
        let next = rx.recv().await.unwrap();
        if !next.subjects.contains(&"first".to_string()) {
            break next;
        }
    };
    assert_eq!(next.subjects, vec!["second"]);

    scheduler.stop().await;
}

/// Stop issued from another task ends the loop before the next tick.
#[tokio::test(start_paused = true)]
async fn test_stop_from_other_task() {
    let (scheduler, mut rx) = BalancedScheduler::new(config(4, 10)).unwrap();
    let scheduler = Arc::new(scheduler);
    scheduler.start();
    assert_eq!(rx.recv().await.unwrap().minute, 0);

    let stopper = Arc::clone(&scheduler);
    tokio::spawn(async move { stopper.stop().await })
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_millis(50);
    let late = collect_until(&mut rx, deadline).await;
    assert!(late.len() <= 1, "at most the tick already queued: {:?}", late);
    assert!(!scheduler.is_running());
}

/// The observer runs once per emitted tick.
#[tokio::test(start_paused = true)]
async fn test_observer_sees_every_tick() {
    #[derive(Default)]
    struct Recorder {
        minutes: parking_lot::Mutex<Vec<u32>>,
    }

    impl TickObserver for Recorder {
        fn on_tick(&self, tick: &RealTimeTick) {
            self.minutes.lock().push(tick.minute);
        }
    }

    let recorder = Arc::new(Recorder::default());
    let (scheduler, mut rx) = BalancedScheduler::new(config(2, 10)).unwrap();
    let scheduler = scheduler.with_observer(recorder.clone());

    scheduler.start();
    let deadline = Instant::now() + Duration::from_millis(45);
    let ticks = collect_until(&mut rx, deadline).await;
    scheduler.stop().await;

    assert_eq!(minutes(&ticks), vec![0, 1, 0, 1]);
    assert_eq!(*recorder.minutes.lock(), vec![0, 1, 0, 1]);
}

/// Hash balancing over a realistic population stays near the ideal share.
#[test]
fn test_hash_balance_over_population() {
    let cfg = config(10, 60_000)
        .with_strategy(BalanceKind::Hash)
        .with_salt("clips");
    let (scheduler, _rx) = BalancedScheduler::new(cfg).unwrap();
    let population = 10_000;
    for id in 0..population {
        scheduler.add(&(40_000_000 + id * 7).to_string());
    }

    let snapshot = scheduler.snapshot();
    assert!(snapshot.is_consistent());
    for minute in 0..10 {
        let share = scheduler.pick(minute).len() as f64 / population as f64;
        assert!((share - 0.1).abs() <= 0.05, "bucket {} share {:.3}", minute, share);
    }
}
