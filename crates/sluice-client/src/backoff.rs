//! Capped exponential backoff for the status poller

use std::time::Duration;

/// Backoff policy configuration
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Interval before growth is applied
    pub baseline: Duration,
    /// Multiplier applied per consecutive failure (>= 1.0)
    pub growth_factor: f64,
    /// Shortest interval ever scheduled
    pub floor: Duration,
    /// Longest interval ever scheduled
    pub ceiling: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            baseline: Duration::from_secs(2),
            growth_factor: 2.0,
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Create a new backoff policy with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the baseline interval
    pub fn baseline(mut self, duration: Duration) -> Self {
        self.baseline = duration;
        self
    }

    /// Set the growth factor
    pub fn growth_factor(mut self, factor: f64) -> Self {
        self.growth_factor = if factor.is_finite() { factor.max(1.0) } else { 1.0 };
        self
    }

    /// Set the shortest interval
    pub fn floor(mut self, duration: Duration) -> Self {
        self.floor = duration;
        self
    }

    /// Set the longest interval
    pub fn ceiling(mut self, duration: Duration) -> Self {
        self.ceiling = duration;
        self
    }

    /// Clamp an interval into `[floor, ceiling]`
    pub fn clamp(&self, interval: Duration) -> Duration {
        let floor = self.floor.min(self.ceiling);
        interval.clamp(floor, self.ceiling)
    }

    /// Interval after `failures` consecutive failures:
    /// `min(ceiling, baseline * growth_factor^failures)`, never below the floor
    pub fn interval_for(&self, failures: u32) -> Duration {
        let base_millis = self.baseline.as_millis() as f64;
        let exponent = failures.min(i32::MAX as u32) as i32;
        let backoff_millis = base_millis * self.growth_factor.powi(exponent);

        // Cap before converting so a large exponent cannot overflow
        let capped = backoff_millis.min(self.ceiling.as_millis() as f64);
        self.clamp(Duration::from_millis(capped as u64))
    }
}
