//! Sizing of the dispatch queue and its worker pool.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{ConfigError, duration_ms};

/// Default number of units the queue holds before shedding load.
pub const DEFAULT_CAPACITY: usize = 5000;
/// Default number of workers kept alive when idle.
pub const DEFAULT_MIN_WORKERS: usize = 5;
/// Default upper bound on concurrent workers.
pub const DEFAULT_MAX_WORKERS: usize = 500;
/// Default time an idle worker above the minimum waits before retiring.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for [`DispatchQueue`](super::DispatchQueue).
///
/// # Default Values
/// - `capacity`: 5000 pending units
/// - `min_workers`: 5
/// - `max_workers`: 500
/// - `idle_timeout`: 10 seconds (`idle_timeout_ms` when deserialized)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Units that may wait for a worker before new units are rejected.
    pub capacity: usize,
    /// Workers that never retire.
    pub min_workers: usize,
    /// Hard cap on concurrent workers.
    pub max_workers: usize,
    /// Idle period after which a worker above `min_workers` retires.
    #[serde(rename = "idle_timeout_ms", deserialize_with = "duration_ms")]
    pub idle_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            min_workers: DEFAULT_MIN_WORKERS,
            max_workers: DEFAULT_MAX_WORKERS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl DispatchConfig {
    /// Clamp values to sane bounds and ensure `min_workers <= max_workers`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use wiresocket::dispatch::DispatchConfig;
    ///
    /// let cfg = DispatchConfig {
    ///     capacity: 0,
    ///     min_workers: 8,
    ///     max_workers: 2,
    ///     idle_timeout: Duration::ZERO,
    /// };
    ///
    /// let normalized = cfg.normalized();
    /// assert_eq!(normalized.capacity, 1);
    /// assert_eq!(normalized.min_workers, 2);
    /// assert_eq!(normalized.max_workers, 8);
    /// assert_eq!(normalized.idle_timeout, Duration::from_millis(1));
    /// ```
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self.min_workers = self.min_workers.max(1);
        self.max_workers = self.max_workers.max(1);
        if self.min_workers > self.max_workers {
            std::mem::swap(&mut self.min_workers, &mut self.max_workers);
        }
        self.idle_timeout = self.idle_timeout.max(Duration::from_millis(1));
        self
    }

    /// Reject configurations that [`normalized`](Self::normalized) would
    /// have to repair.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.min_workers == 0 || self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.min_workers > self.max_workers {
            return Err(ConfigError::InvertedWorkerBounds {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroIdleTimeout);
        }
        Ok(())
    }
}
