//! Metrics for the sync engine
//!
//! Thin helpers over the `metrics` facade. Nothing is exported unless a
//! recorder is installed (the CLI installs the Prometheus one).

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const USN_ALLOCATED: &str = "sync.usn.allocated";
pub const MUTATIONS_RECORDED: &str = "sync.mutations.recorded";
pub const MUTATIONS_REJECTED: &str = "sync.mutations.rejected";
pub const FRAGMENTS_SERVED: &str = "sync.fragments.served";
pub const FRAGMENT_ITEMS: &str = "sync.fragment.items";
pub const FRAGMENT_BUILD_MS: &str = "sync.fragment.build_ms";
pub const HTTP_REQUEST_MS: &str = "http.request.duration_ms";

/// Register metric descriptions
pub fn init_metrics() {
    describe_counter!(USN_ALLOCATED, "Update sequence numbers handed out");
    describe_counter!(MUTATIONS_RECORDED, "Book and note mutations committed");
    describe_counter!(MUTATIONS_REJECTED, "Mutations refused before a USN was allocated");
    describe_counter!(FRAGMENTS_SERVED, "Sync fragments returned to clients");
    describe_histogram!(FRAGMENT_ITEMS, "Items per sync fragment");
    describe_histogram!(FRAGMENT_BUILD_MS, "Fragment build duration in milliseconds");
    describe_histogram!(HTTP_REQUEST_MS, "HTTP request duration in milliseconds");
}

/// Record a counter metric
pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Record a histogram metric
pub fn record_histogram(name: &'static str, value: f64) {
    histogram!(name).record(value);
}

/// Timer for measuring operation duration
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    /// Stop the timer and record the duration in milliseconds
    pub fn stop(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.name).record(elapsed_ms);
        elapsed_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        init_metrics();
        record_counter(USN_ALLOCATED, 1);
        record_histogram(FRAGMENT_ITEMS, 3.0);
    }

    #[test]
    fn test_timer_reports_elapsed() {
        let timer = Timer::new(FRAGMENT_BUILD_MS);
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(timer.stop() >= 1.0);
    }
}
