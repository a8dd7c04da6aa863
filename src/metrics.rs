//! Metrics and observability for the conversion pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use serde::{Deserialize, Serialize};

/// Pipeline metrics collector
#[derive(Default)]
pub struct Metrics {
    pub uploads: AtomicU64,
    pub total_runs: AtomicU64,
    pub completed_runs: AtomicU64,
    pub failed_runs: AtomicU64,
    pub total_latency_ms: AtomicU64,

    pub captions_received: AtomicU64,
    pub captions_missing: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_uploads(&self, count: usize) {
        self.uploads.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_run(&self, success: bool, latency_ms: u64) {
        self.total_runs.fetch_add(1, Ordering::Relaxed);

        if success {
            self.completed_runs.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_runs.fetch_add(1, Ordering::Relaxed);
        }

        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_caption(&self, received: bool) {
        if received {
            self.captions_received.fetch_add(1, Ordering::Relaxed);
        } else {
            self.captions_missing.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_bytes(&self, input: usize, output: usize) {
        self.bytes_in.fetch_add(input as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(output as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_runs.load(Ordering::Relaxed);
        let failed = self.failed_runs.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            uploads: self.uploads.load(Ordering::Relaxed),
            total_runs: total,
            completed_runs: self.completed_runs.load(Ordering::Relaxed),
            failed_runs: failed,
            error_rate: if total > 0 { failed as f64 / total as f64 } else { 0.0 },
            avg_latency_ms: if total > 0 { total_latency / total } else { 0 },
            captions: CaptionMetrics {
                received: self.captions_received.load(Ordering::Relaxed),
                missing: self.captions_missing.load(Ordering::Relaxed),
            },
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uploads: u64,
    pub total_runs: u64,
    pub completed_runs: u64,
    pub failed_runs: u64,
    pub error_rate: f64,
    pub avg_latency_ms: u64,
    pub captions: CaptionMetrics,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptionMetrics {
    pub received: u64,
    pub missing: u64,
}

/// Timer for tracking operation latency
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
