//! Tick notification hook.
//!
//! The scheduler calls a [`TickObserver`] synchronously after each tick has
//! been delivered to the output channel. Observers must return quickly; the
//! tick loop does not advance until they do.

use super::cycle::RealTimeTick;

/// Receives every tick after it has been emitted.
///
/// # Implementors
///
/// - `NoopObserver` - default, does nothing
/// - `LoggingObserver` - logs each tick at debug level
pub trait TickObserver: Send + Sync {
    /// Called once per emitted tick.
    fn on_tick(&self, tick: &RealTimeTick);
}

/// Observer that ignores every tick.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TickObserver for NoopObserver {
    fn on_tick(&self, _tick: &RealTimeTick) {}
}

/// Observer that logs each tick's bucket and occupancy.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl TickObserver for LoggingObserver {
    fn on_tick(&self, tick: &RealTimeTick) {
        tracing::debug!(
            minute = tick.minute,
            subjects = tick.subjects.len(),
            "Tick emitted"
        );
    }
}
