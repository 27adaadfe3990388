//! Statistics and metrics

pub mod metrics;

pub use metrics::{PipelineStats, PipelineStatsSnapshot, PipelineStatus};
