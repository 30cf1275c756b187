use std::fmt;

use serde::{Deserialize, Serialize};

use crate::risk::counters::RiskCounters;

pub const MAX_SCORE: u8 = 100;

const HIGH_SEVERITY_POINTS: f64 = 20.0;
const MEDIUM_SEVERITY_POINTS: f64 = 10.0;
const LOW_SEVERITY_POINTS: f64 = 5.0;

// Maximum points each whole-session frame ratio can contribute.
const ABSENT_RATIO_POINTS: f64 = 30.0;
const MULTI_FACE_RATIO_POINTS: f64 = 40.0;
const LOOK_AWAY_RATIO_POINTS: f64 = 20.0;

/// Per-term contributions before clamping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreContributions {
    pub severity_points: f64,
    pub absent_points: f64,
    pub multi_face_points: f64,
    pub look_away_points: f64,
}

impl ScoreContributions {
    pub fn raw_total(&self) -> f64 {
        self.severity_points + self.absent_points + self.multi_face_points + self.look_away_points
    }
}

pub fn score_contributions(counters: &RiskCounters) -> ScoreContributions {
    let severity_points = HIGH_SEVERITY_POINTS * f64::from(counters.high_count)
        + MEDIUM_SEVERITY_POINTS * f64::from(counters.medium_count)
        + LOW_SEVERITY_POINTS * f64::from(counters.low_count);

    if counters.total_frames == 0 {
        return ScoreContributions {
            severity_points,
            ..ScoreContributions::default()
        };
    }

    let total = counters.total_frames as f64;
    ScoreContributions {
        severity_points,
        absent_points: ABSENT_RATIO_POINTS * (counters.absent_frames as f64 / total),
        multi_face_points: MULTI_FACE_RATIO_POINTS * (counters.multi_face_frames as f64 / total),
        look_away_points: LOOK_AWAY_RATIO_POINTS * (counters.look_away_frames as f64 / total),
    }
}

fn clamped_raw(counters: &RiskCounters) -> f64 {
    score_contributions(counters)
        .raw_total()
        .clamp(0.0, f64::from(MAX_SCORE))
}

/// Deterministic 0-100 risk score.
pub fn score(counters: &RiskCounters) -> u8 {
    clamped_raw(counters).round() as u8
}

/// Level band of the unrounded score, so 19.5 is still Low.
pub fn risk_level(counters: &RiskCounters) -> RiskLevel {
    RiskLevel::from_raw(clamped_raw(counters))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_raw(raw: f64) -> Self {
        if raw < 20.0 {
            RiskLevel::Low
        } else if raw < 50.0 {
            RiskLevel::Medium
        } else if raw < 75.0 {
            RiskLevel::High
        } else {
            RiskLevel::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskLevel::Low => "No significant concerns detected.",
            RiskLevel::Medium => "Some suspicious activity detected. Review recommended.",
            RiskLevel::High => {
                "Multiple indicators of potential academic dishonesty. Mandatory review required."
            }
            RiskLevel::Critical => "Severe violations detected. Consider invalidating assessment.",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
