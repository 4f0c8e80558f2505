//! # Metrics Collection
//!
//! Lock-free counters for the frame dispatcher and the streams it drives:
//!
//! - **Counters**: frames processed/rejected, FIBs, database updates, failures
//! - **Gauges**: registered channels
//! - **Histograms**: per-frame dispatch latency
//!
//! ## Example
//!
//! ```rust
//! use dab_core::observe::RadioMetrics;
//!
//! let metrics = RadioMetrics::new();
//! metrics.frames_processed.inc();
//! metrics.channels_registered.set(3);
//! metrics.frame_latency_us.observe(850.0);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.frames_processed, 1);
//! ```

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A simple atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment by 1.
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by a specific amount.
    #[inline]
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// A simple atomic gauge (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicI64,
}

impl Gauge {
    /// Create a new gauge.
    pub fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Set the value.
    #[inline]
    pub fn set(&self, v: i64) {
        self.value.store(v, Ordering::Relaxed);
    }

    /// Increment by 1.
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1.
    #[inline]
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A simple histogram with fixed buckets.
#[derive(Debug)]
pub struct Histogram {
    /// Bucket boundaries
    boundaries: Vec<f64>,
    /// Bucket counts (len = boundaries.len() + 1 for overflow bucket)
    buckets: Vec<AtomicU64>,
    /// Sum of all observed values, in thousandths
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::latency_us()
    }
}

impl Histogram {
    /// Create a new histogram with custom bucket boundaries.
    pub fn new(boundaries: Vec<f64>) -> Self {
        let num_buckets = boundaries.len() + 1;
        Self {
            boundaries,
            buckets: (0..num_buckets).map(|_| AtomicU64::new(0)).collect(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Buckets for microsecond latencies, up to a mode I frame (96 ms).
    pub fn latency_us() -> Self {
        Self::new(vec![
            100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 25000.0, 50000.0, 96000.0,
        ])
    }

    /// Observe a value.
    pub fn observe(&self, value: f64) {
        let bucket_idx = self
            .boundaries
            .iter()
            .position(|&b| value < b)
            .unwrap_or(self.boundaries.len());

        self.buckets[bucket_idx].fetch_add(1, Ordering::Relaxed);
        self.sum
            .fetch_add((value.max(0.0) * 1000.0) as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the count of observations.
    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the sum of all observations.
    #[inline]
    pub fn sum(&self) -> f64 {
        self.sum.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Get the bucket counts.
    pub fn bucket_counts(&self) -> Vec<u64> {
        self.buckets
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .collect()
    }
}

/// Counters of one radio instance.
///
/// Shared by `Arc` between the dispatcher, the control stream and every
/// program channel.
#[derive(Debug, Default)]
pub struct RadioMetrics {
    /// Frames dispatched to the decoders
    pub frames_processed: Counter,
    /// Frames dropped for having the wrong length
    pub frames_rejected: Counter,
    /// FIBs that passed their CRC
    pub fibs_decoded: Counter,
    /// FIBs that failed their CRC
    pub fib_crc_failures: Counter,
    /// Database publications that changed something
    pub database_updates: Counter,
    /// Currently registered program channels
    pub channels_registered: Gauge,
    /// Subchannels permanently refused
    pub registrations_refused: Counter,
    /// Stream tasks that returned an error or panicked
    pub channel_task_failures: Counter,
    /// Registration subscribers that panicked
    pub observer_failures: Counter,
    /// Logical frames delivered by program channels
    pub logical_frames_decoded: Counter,
    /// Time spent in one `process` call
    pub frame_latency_us: Histogram,
}

impl RadioMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_processed: self.frames_processed.get(),
            frames_rejected: self.frames_rejected.get(),
            fibs_decoded: self.fibs_decoded.get(),
            fib_crc_failures: self.fib_crc_failures.get(),
            database_updates: self.database_updates.get(),
            channels_registered: self.channels_registered.get(),
            registrations_refused: self.registrations_refused.get(),
            channel_task_failures: self.channel_task_failures.get(),
            observer_failures: self.observer_failures.get(),
            logical_frames_decoded: self.logical_frames_decoded.get(),
            frame_latency_count: self.frame_latency_us.count(),
            frame_latency_sum_us: self.frame_latency_us.sum(),
        }
    }

    /// Reset all counters to zero. Gauges keep their value.
    pub fn reset(&self) {
        self.frames_processed.reset();
        self.frames_rejected.reset();
        self.fibs_decoded.reset();
        self.fib_crc_failures.reset();
        self.database_updates.reset();
        self.registrations_refused.reset();
        self.channel_task_failures.reset();
        self.observer_failures.reset();
        self.logical_frames_decoded.reset();
    }

    /// Export metrics in Prometheus text format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let entries: [(&str, &str, &str, String); 10] = [
            ("dab_frames_processed_total", "Frames dispatched", "counter", s.frames_processed.to_string()),
            ("dab_frames_rejected_total", "Frames with wrong length", "counter", s.frames_rejected.to_string()),
            ("dab_fibs_decoded_total", "FIBs with valid CRC", "counter", s.fibs_decoded.to_string()),
            ("dab_fib_crc_failures_total", "FIBs with CRC errors", "counter", s.fib_crc_failures.to_string()),
            ("dab_database_updates_total", "Database changes published", "counter", s.database_updates.to_string()),
            ("dab_channels_registered", "Registered program channels", "gauge", s.channels_registered.to_string()),
            ("dab_registrations_refused_total", "Subchannels refused", "counter", s.registrations_refused.to_string()),
            ("dab_channel_task_failures_total", "Failed stream tasks", "counter", s.channel_task_failures.to_string()),
            ("dab_observer_failures_total", "Panicking registration subscribers", "counter", s.observer_failures.to_string()),
            ("dab_logical_frames_total", "Logical frames decoded", "counter", s.logical_frames_decoded.to_string()),
        ];

        let mut output = String::new();
        for (name, help, kind, value) in entries.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} {}\n", name, kind));
            output.push_str(&format!("{} {}\n", name, value));
        }
        output
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub fibs_decoded: u64,
    pub fib_crc_failures: u64,
    pub database_updates: u64,
    pub channels_registered: i64,
    pub registrations_refused: u64,
    pub channel_task_failures: u64,
    pub observer_failures: u64,
    pub logical_frames_decoded: u64,
    pub frame_latency_count: u64,
    pub frame_latency_sum_us: f64,
}

impl MetricsSnapshot {
    /// Average time spent per frame in microseconds.
    pub fn avg_frame_latency_us(&self) -> f64 {
        if self.frame_latency_count == 0 {
            0.0
        } else {
            self.frame_latency_sum_us / self.frame_latency_count as f64
        }
    }

    /// Fraction of FIBs that passed their CRC.
    pub fn fib_success_rate(&self) -> f64 {
        let total = self.fibs_decoded + self.fib_crc_failures;
        if total == 0 {
            1.0
        } else {
            self.fibs_decoded as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new();
        counter.inc();
        counter.inc_by(99);
        assert_eq!(counter.get(), 100);
        counter.reset();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new();
        gauge.set(3);
        gauge.inc();
        gauge.dec();
        gauge.dec();
        assert_eq!(gauge.get(), 2);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new(vec![10.0, 100.0]);
        hist.observe(5.0);
        hist.observe(50.0);
        hist.observe(500.0);
        assert_eq!(hist.count(), 3);
        assert!((hist.sum() - 555.0).abs() < 0.01);
        assert_eq!(hist.bucket_counts(), vec![1, 1, 1]);
    }

    #[test]
    fn test_snapshot_and_rates() {
        let metrics = RadioMetrics::new();
        metrics.fibs_decoded.inc_by(9);
        metrics.fib_crc_failures.inc();
        metrics.channels_registered.set(2);
        metrics.frame_latency_us.observe(1000.0);
        metrics.frame_latency_us.observe(3000.0);

        let s = metrics.snapshot();
        assert!((s.fib_success_rate() - 0.9).abs() < 1e-9);
        assert!((s.avg_frame_latency_us() - 2000.0).abs() < 0.01);

        metrics.reset();
        let s = metrics.snapshot();
        assert_eq!(s.fibs_decoded, 0);
        assert_eq!(s.channels_registered, 2);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = RadioMetrics::new();
        metrics.frames_rejected.inc_by(4);
        let output = metrics.to_prometheus();
        assert!(output.contains("dab_frames_rejected_total 4"));
        assert!(output.contains("# TYPE dab_channels_registered gauge"));
    }
}
