use serde::{Deserialize, Serialize};

use crate::risk::counters::{FrameStatistics, RiskCounters, SeverityBreakdown};
use crate::risk::scoring::{risk_level, score, score_contributions, RiskLevel, ScoreContributions};

/// Reviewer-facing projection of a session's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub session_id: String,
    pub score: u8,
    pub level: RiskLevel,
    pub recommendation: String,
    pub breakdown: SeverityBreakdown,
    pub statistics: FrameStatistics,
    pub contributions: ScoreContributions,
}

impl RiskAssessment {
    pub fn from_counters(session_id: &str, counters: &RiskCounters) -> Self {
        let score = score(counters);
        let level = risk_level(counters);

        Self {
            session_id: session_id.to_string(),
            score,
            level,
            recommendation: level.recommendation().to_string(),
            breakdown: counters.severity_breakdown(),
            statistics: counters.statistics(),
            contributions: score_contributions(counters),
        }
    }
}
