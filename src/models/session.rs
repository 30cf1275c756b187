use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Violation, ViolationType};
use crate::risk::{FrameStatistics, RiskLevel, SeverityBreakdown};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Ended,
    Terminated,
    /// Found still active in storage after a restart; never reached live.
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "Active",
            SessionStatus::Ended => "Ended",
            SessionStatus::Terminated => "Terminated",
            SessionStatus::Interrupted => "Interrupted",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the run counters currently say about the candidate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentConditions {
    pub face_detected: bool,
    pub multiple_faces: bool,
    pub looking_away: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub session_id: String,
    pub task_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub risk_score: u8,
    pub level: RiskLevel,
    pub violation_count: u32,
    pub total_frames: u64,
    pub last_frame_number: u64,
    pub started_at: DateTime<Utc>,
    pub current: CurrentConditions,
}

/// Frozen record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub task_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub total_frames: u64,
    pub risk_score: u8,
    pub level: RiskLevel,
    pub severity_counts: SeverityBreakdown,
    pub category_counts: BTreeMap<ViolationType, u32>,
    pub statistics: FrameStatistics,
    pub violations: Vec<Violation>,
}

pub fn count_by_category(violations: &[Violation]) -> BTreeMap<ViolationType, u32> {
    let mut counts: BTreeMap<ViolationType, u32> = ViolationType::ALL
        .into_iter()
        .map(|violation_type| (violation_type, 0))
        .collect();
    for violation in violations {
        *counts.entry(violation.violation_type).or_insert(0) += 1;
    }
    counts
}
