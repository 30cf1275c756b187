use serde::{Deserialize, Serialize};

/// Timing of one accepted frame, from lock acquisition to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMetrics {
    pub processing_micros: u64,
    pub violations: u32,
    pub terminated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub frames_processed: u64,
    pub frames_rejected: u64,
    pub violations_emitted: u64,
    pub sessions_created: u64,
    pub sessions_terminated: u64,
    pub total_processing_micros: u64,
    pub max_processing_micros: u64,
    pub mean_processing_micros: f64,
}
