//! Statistics and metrics for capture/annotate pipelines

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle status of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Source playing, frames flowing
    Running,
    /// Source ended or failed, waiting to reinitialize
    Reconnecting,
    /// Too many consecutive failures, no further reconnects
    Disabled,
    /// `stop()` in progress
    Stopping,
    /// Threads joined
    Stopped,
}

/// Live counters shared between capture, annotate and supervisor threads
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    frames_annotated: AtomicU64,
    frames_published: AtomicU64,
    inference_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl PipelineStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_captured(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_annotated(&self) {
        self.frames_annotated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_published(&self) {
        self.frames_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_inference_failure(&self) {
        self.inference_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self, status: PipelineStatus) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            status,
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_annotated: self.frames_annotated.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            inference_failures: self.inference_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Pipeline-level statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    /// Current status
    pub status: PipelineStatus,
    /// Frames accepted by the capture side
    pub frames_captured: u64,
    /// Frames discarded because the annotate side was busy
    pub frames_dropped: u64,
    /// Frames the AI engine annotated successfully
    pub frames_annotated: u64,
    /// Frames published to the channel
    pub frames_published: u64,
    /// AI engine calls that failed
    pub inference_failures: u64,
    /// Successful source reinitializations
    pub reconnects: u64,
}

impl PipelineStatsSnapshot {
    /// Fraction of offered frames that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let offered = self.frames_captured + self.frames_dropped;
        if offered > 0 {
            self.frames_dropped as f64 / offered as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_stats_new() {
        let stats = PipelineStats::new();
        let snap = stats.snapshot(PipelineStatus::Running);

        assert_eq!(snap.frames_captured, 0);
        assert_eq!(snap.frames_dropped, 0);
        assert_eq!(snap.frames_annotated, 0);
        assert_eq!(snap.frames_published, 0);
        assert_eq!(snap.inference_failures, 0);
        assert_eq!(snap.reconnects, 0);
        assert_eq!(snap.status, PipelineStatus::Running);
    }

    #[test]
    fn test_counters() {
        let stats = PipelineStats::new();
        stats.record_captured();
        stats.record_captured();
        stats.record_dropped();
        stats.record_annotated();
        stats.record_published();
        stats.record_inference_failure();
        stats.record_reconnect();

        let snap = stats.snapshot(PipelineStatus::Stopped);
        assert_eq!(snap.frames_captured, 2);
        assert_eq!(snap.frames_dropped, 1);
        assert_eq!(snap.frames_annotated, 1);
        assert_eq!(snap.frames_published, 1);
        assert_eq!(snap.inference_failures, 1);
        assert_eq!(snap.reconnects, 1);
    }

    #[test]
    fn test_drop_ratio() {
        let stats = PipelineStats::new();
        assert_eq!(stats.snapshot(PipelineStatus::Running).drop_ratio(), 0.0);

        stats.record_captured();
        stats.record_dropped();
        stats.record_dropped();
        stats.record_dropped();

        let ratio = stats.snapshot(PipelineStatus::Running).drop_ratio();
        assert!((ratio - 0.75).abs() < f64::EPSILON);
    }
}
