use serde::{Deserialize, Serialize};

use crate::classifier::FrameConditions;
use crate::models::{Severity, Violation};

/// Everything the risk score is computed from. Plain counts, so the score
/// depends on nothing but what has been accumulated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskCounters {
    pub total_frames: u64,
    pub present_frames: u64,
    pub absent_frames: u64,
    pub multi_face_frames: u64,
    pub look_away_frames: u64,
    pub high_count: u32,
    pub medium_count: u32,
    pub low_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeverityBreakdown {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

/// Share of frames, in percent, spent in each observed condition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStatistics {
    pub face_present_percentage: f64,
    pub face_absent_percentage: f64,
    pub multiple_face_percentage: f64,
    pub look_away_percentage: f64,
}

impl RiskCounters {
    /// Fold one accepted frame into the counters.
    pub fn record_frame(&mut self, conditions: &FrameConditions, violations: &[Violation]) {
        self.total_frames += 1;
        if conditions.face_present {
            self.present_frames += 1;
        }
        if conditions.face_absent {
            self.absent_frames += 1;
        }
        if conditions.multiple_faces {
            self.multi_face_frames += 1;
        }
        if conditions.looking_away {
            self.look_away_frames += 1;
        }

        for violation in violations {
            match violation.severity {
                Severity::High => self.high_count += 1,
                Severity::Medium => self.medium_count += 1,
                Severity::Low => self.low_count += 1,
            }
        }
    }

    pub fn violation_count(&self) -> u32 {
        self.high_count + self.medium_count + self.low_count
    }

    pub fn severity_breakdown(&self) -> SeverityBreakdown {
        SeverityBreakdown {
            high: self.high_count,
            medium: self.medium_count,
            low: self.low_count,
        }
    }

    pub fn statistics(&self) -> FrameStatistics {
        let percentage = |frames: u64| frames as f64 / self.total_frames.max(1) as f64 * 100.0;

        FrameStatistics {
            face_present_percentage: percentage(self.present_frames),
            face_absent_percentage: percentage(self.absent_frames),
            multiple_face_percentage: percentage(self.multi_face_frames),
            look_away_percentage: percentage(self.look_away_frames),
        }
    }
}
