//! Fixed-size rolling average over the most recent observations.
//!
//! Maintains a circular buffer of the last `size` values together with their
//! running sum, so each update is O(1) regardless of the window length.

/// Slots reserved by [`WindowedAverage::new`] before any observation.
const MAX_RESERVED: usize = 1024;

/// Rolling average over the most recent `size` observations.
///
/// The divisor ramps up with the number of observations seen so far and
/// stabilizes at `size`, so unfilled slots never dilute the average.
///
/// # Example
///
/// ```
/// use cyclepoll::stats::WindowedAverage;
///
/// let mut avg = WindowedAverage::new(2);
/// avg.put(10.0);
/// assert_eq!(avg.average(), 10.0);
/// avg.put(20.0);
/// avg.put(30.0);
/// assert_eq!(avg.average(), 25.0);
/// ```
#[derive(Debug, Clone)]
pub struct WindowedAverage {
    /// Ring buffer of observations; once full, slot `count % size` is overwritten next.
    values: Vec<f64>,

    /// Maximum number of observations kept.
    size: usize,

    /// Sum of the values currently in the ring.
    sum: f64,

    /// Total number of observations ever inserted.
    count: u64,
}

impl WindowedAverage {
    /// Creates an empty window holding up to `size` observations.
    ///
    /// A `size` of zero is bumped to one.
    /// The ring fills on demand; only a bounded amount is reserved up front.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            values: Vec::with_capacity(size.min(MAX_RESERVED)),
            size,
            sum: 0.0,
            count: 0,
        }
    }

    /// Records an observation, evicting the oldest once the window is full.
    pub fn put(&mut self, value: f64) {
        if self.values.len() < self.size {
            self.values.push(value);
            self.sum += value;
        } else {
            let slot = (self.count % self.size as u64) as usize;
            let evicted = std::mem::replace(&mut self.values[slot], value);
            self.sum += value - evicted;
        }
        self.count += 1;
    }

    /// Returns the mean of the last `min(len, size)` observations.
    ///
    /// Returns `0.0` before the first observation.
    pub fn average(&self) -> f64 {
        let filled = self.len();
        if filled == 0 {
            return 0.0;
        }
        self.sum / filled as f64
    }

    /// Number of observations currently contributing to the average.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true before the first observation.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Capacity of the window.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total observations recorded since creation.
    pub fn observations(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_average(values: &[f64], size: usize) -> f64 {
        let start = values.len().saturating_sub(size);
        let tail = &values[start..];
        tail.iter().sum::<f64>() / tail.len() as f64
    }

    #[test]
    fn test_empty_average_is_zero() {
        let avg = WindowedAverage::new(4);
        assert!(avg.is_empty());
        assert_eq!(avg.average(), 0.0);
        assert_eq!(avg.len(), 0);
    }

    #[test]
    fn test_average_matches_naive_recomputation() {
        let inputs = [3.0, 9.0, 1.0, 12.0, 7.0, 7.0, 100.0, 0.0, 4.5, 18.0, 2.0, 61.0];
        let mut avg = WindowedAverage::new(4);
        let mut seen = Vec::new();

        for value in inputs {
            avg.put(value);
            seen.push(value);
            let expected = naive_average(&seen, 4);
            assert!(
                (avg.average() - expected).abs() < 1e-9,
                "after {:?}: got {}, expected {}",
                seen,
                avg.average(),
                expected
            );
        }
        assert_eq!(avg.observations(), inputs.len() as u64);
    }

    #[test]
    fn test_divisor_ramps_up_to_size() {
        let mut avg = WindowedAverage::new(3);
        avg.put(6.0);
        assert_eq!(avg.len(), 1);
        assert_eq!(avg.average(), 6.0);

        avg.put(0.0);
        assert_eq!(avg.len(), 2);
        assert_eq!(avg.average(), 3.0);

        avg.put(3.0);
        avg.put(3.0);
        assert_eq!(avg.len(), 3);
        assert_eq!(avg.average(), 2.0);
    }

    #[test]
    fn test_huge_size_reserves_lazily() {
        let mut avg = WindowedAverage::new(usize::MAX);
        assert_eq!(avg.size(), usize::MAX);
        avg.put(4.0);
        avg.put(8.0);
        assert_eq!(avg.len(), 2);
        assert_eq!(avg.average(), 6.0);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut avg = WindowedAverage::new(0);
        assert_eq!(avg.size(), 1);
        avg.put(5.0);
        avg.put(9.0);
        assert_eq!(avg.average(), 9.0);
    }
}
