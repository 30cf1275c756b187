pub mod assessment;
pub mod counters;
pub mod scoring;

pub use assessment::RiskAssessment;
pub use counters::{FrameStatistics, RiskCounters, SeverityBreakdown};
pub use scoring::{risk_level, score, score_contributions, RiskLevel, ScoreContributions, MAX_SCORE};
