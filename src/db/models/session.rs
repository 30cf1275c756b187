//! Persisted shapes of a proctoring session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SessionStatus, Violation};
use crate::risk::RiskCounters;
use crate::settings::Settings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub task_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_frame_number: u64,
    pub counters: RiskCounters,
    pub risk_score: u8,
    pub settings: Settings,
    pub has_reference: bool,
    pub updated_at: DateTime<Utc>,
}

/// Everything one accepted frame changes. Written as a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub session_id: String,
    pub frame_number: u64,
    pub counters: RiskCounters,
    pub risk_score: u8,
    pub status: SessionStatus,
    pub ended_at: Option<DateTime<Utc>>,
    pub violations: Vec<Violation>,
    pub recorded_at: DateTime<Utc>,
}
