//! Pipeline counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the pipeline threads
#[derive(Debug, Default)]
pub struct PipelineStats {
    submitted: AtomicU64,
    encoded: AtomicU64,
    encode_failures: AtomicU64,
    sent: AtomicU64,
    bytes_sent: AtomicU64,
    worker_restarts: AtomicU64,
}

impl PipelineStats {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encoded(&self) {
        self.encoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_restart(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a pipeline's counters and queue levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub submitted: u64,
    pub ingest_dropped: u64,
    pub encoded: u64,
    pub encode_failures: u64,
    pub egress_dropped: u64,
    pub sent: u64,
    pub bytes_sent: u64,
    pub worker_restarts: u64,
    pub ingest_len: usize,
    pub egress_len: usize,
}

impl StatsSnapshot {
    pub(crate) fn collect(
        stats: &PipelineStats,
        ingest_dropped: u64,
        egress_dropped: u64,
        ingest_len: usize,
        egress_len: usize,
    ) -> Self {
        Self {
            submitted: stats.submitted.load(Ordering::Relaxed),
            ingest_dropped,
            encoded: stats.encoded.load(Ordering::Relaxed),
            encode_failures: stats.encode_failures.load(Ordering::Relaxed),
            egress_dropped,
            sent: stats.sent.load(Ordering::Relaxed),
            bytes_sent: stats.bytes_sent.load(Ordering::Relaxed),
            worker_restarts: stats.worker_restarts.load(Ordering::Relaxed),
            ingest_len,
            egress_len,
        }
    }

    /// Fraction of submitted items that never reached the wire
    pub fn loss_ratio(&self) -> f64 {
        if self.submitted == 0 {
            return 0.0;
        }
        let lost = self.submitted.saturating_sub(self.sent);
        lost as f64 / self.submitted as f64
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "submitted={} encoded={} sent={} ({} KiB) dropped={}/{} failures={} restarts={} queued={}/{} loss={:.1}%",
            self.submitted,
            self.encoded,
            self.sent,
            self.bytes_sent / 1024,
            self.ingest_dropped,
            self.egress_dropped,
            self.encode_failures,
            self.worker_restarts,
            self.ingest_len,
            self.egress_len,
            self.loss_ratio() * 100.0
        )
    }
}
