//! Progress tracking with interval-based logging.
//!
//! [`ProgressTracker`] counts items across threads and logs a message each time
//! the count crosses a multiple of the configured interval. Merge workers and
//! the unmapped collector share one tracker so long merges show liveness.
//!
//! # Example
//! ```no_run
//! use bamstitch_lib::progress::ProgressTracker;
//! use std::sync::Arc;
//!
//! let tracker = Arc::new(ProgressTracker::new("Merged records").with_interval(1_000_000));
//! let t = Arc::clone(&tracker);
//! std::thread::spawn(move || {
//!     t.log_if_needed(4096);
//! });
//! ```

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe progress tracker with interval-based logging.
pub struct ProgressTracker {
    /// The logging interval - progress is logged when count crosses multiples of this.
    interval: u64,
    /// Message prefix for log output.
    message: String,
    /// Internal count of items processed (thread-safe).
    count: AtomicU64,
}

impl ProgressTracker {
    /// Create a new progress tracker with the specified message.
    ///
    /// The tracker starts with a count of 0 and a default interval of 1,000,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 1_000_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Set the logging interval.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Add `additional` items to the count and log once per interval boundary crossed.
    ///
    /// Returns `true` if the new count is exactly on an interval boundary.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && count % self.interval == 0;
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;

        let prev_intervals = prev / self.interval;
        let new_intervals = new_count / self.interval;

        for i in (prev_intervals + 1)..=new_intervals {
            let milestone = i * self.interval;
            info!("{} {}", self.message, milestone);
        }

        new_count % self.interval == 0
    }

    /// Log final progress if the count did not land exactly on an interval.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    /// Get the current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
