//! Rolling statistics used as fetch stopping signals.

mod windowed;

pub use windowed::WindowedAverage;
