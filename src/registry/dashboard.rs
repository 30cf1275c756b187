use serde::Serialize;

use crate::models::{SessionStatus, Violation};
use crate::risk::RiskLevel;

use super::state::SessionSnapshot;

pub const HIGH_RISK_SCORE: u8 = 50;
pub const REVIEW_SCORE: u8 = 30;
pub const REVIEW_LIMIT: usize = 20;
pub const RECENT_VIOLATION_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    pub session_id: String,
    pub task_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub risk_score: u8,
    pub level: RiskLevel,
    pub violation_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentViolation {
    pub session_id: String,
    pub student_id: String,
    #[serde(flatten)]
    pub violation: Violation,
}

/// Cross-session overview for reviewers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_sessions: usize,
    pub active_sessions: usize,
    pub high_risk_sessions: usize,
    pub sessions_needing_review: Vec<ReviewEntry>,
    pub recent_high_severity_violations: Vec<RecentViolation>,
}

impl DashboardSnapshot {
    pub fn from_snapshots(snapshots: &[SessionSnapshot]) -> Self {
        let closed = || snapshots.iter().filter(|snapshot| !snapshot.status.is_active());

        let mut review: Vec<ReviewEntry> = closed()
            .filter(|snapshot| snapshot.risk_score >= REVIEW_SCORE)
            .map(|snapshot| ReviewEntry {
                session_id: snapshot.session_id.clone(),
                task_id: snapshot.task_id.clone(),
                student_id: snapshot.student_id.clone(),
                status: snapshot.status,
                risk_score: snapshot.risk_score,
                level: snapshot.level,
                violation_count: snapshot.counters.violation_count(),
            })
            .collect();
        review.sort_by(|a, b| {
            b.risk_score
                .cmp(&a.risk_score)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        review.truncate(REVIEW_LIMIT);

        let mut recent: Vec<RecentViolation> = snapshots
            .iter()
            .flat_map(|snapshot| {
                snapshot
                    .recent_high_violations
                    .iter()
                    .map(move |violation| RecentViolation {
                        session_id: snapshot.session_id.clone(),
                        student_id: snapshot.student_id.clone(),
                        violation: violation.clone(),
                    })
            })
            .collect();
        recent.sort_by(|a, b| b.violation.timestamp.cmp(&a.violation.timestamp));
        recent.truncate(RECENT_VIOLATION_LIMIT);

        Self {
            total_sessions: snapshots.len(),
            active_sessions: snapshots
                .iter()
                .filter(|snapshot| snapshot.status.is_active())
                .count(),
            high_risk_sessions: closed()
                .filter(|snapshot| snapshot.risk_score >= HIGH_RISK_SCORE)
                .count(),
            sessions_needing_review: review,
            recent_high_severity_violations: recent,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;
    use crate::models::{CurrentConditions, Severity, ViolationType};
    use crate::risk::RiskCounters;

    fn snapshot(id: &str, status: SessionStatus, risk_score: u8) -> SessionSnapshot {
        SessionSnapshot {
            session_id: id.to_string(),
            task_id: "task".to_string(),
            student_id: format!("student-{id}"),
            status,
            risk_score,
            level: RiskLevel::from_raw(f64::from(risk_score)),
            counters: RiskCounters::default(),
            last_frame_number: 0,
            started_at: Utc::now(),
            ended_at: None,
            current: CurrentConditions::default(),
            recent_high_violations: Vec::new(),
        }
    }

    #[test]
    fn test_only_closed_sessions_count_as_high_risk_or_review() {
        let snapshots = vec![
            snapshot("a", SessionStatus::Active, 90),
            snapshot("b", SessionStatus::Ended, 55),
            snapshot("c", SessionStatus::Terminated, 80),
            snapshot("d", SessionStatus::Ended, 35),
            snapshot("e", SessionStatus::Ended, 10),
        ];

        let dashboard = DashboardSnapshot::from_snapshots(&snapshots);
        assert_eq!(dashboard.total_sessions, 5);
        assert_eq!(dashboard.active_sessions, 1);
        assert_eq!(dashboard.high_risk_sessions, 2);

        let ids: Vec<&str> = dashboard
            .sessions_needing_review
            .iter()
            .map(|entry| entry.session_id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
    }

    #[test]
    fn test_review_list_and_feed_are_capped() {
        let base = Utc::now();
        let snapshots: Vec<SessionSnapshot> = (0..25)
            .map(|i| {
                let mut snap = snapshot(&format!("s{i:02}"), SessionStatus::Ended, 40);
                snap.recent_high_violations.push(Violation::new(
                    ViolationType::MultipleFaces,
                    Severity::High,
                    0.85,
                    1,
                    base + Duration::seconds(i),
                    json!({}),
                ));
                snap
            })
            .collect();

        let dashboard = DashboardSnapshot::from_snapshots(&snapshots);
        assert_eq!(dashboard.sessions_needing_review.len(), REVIEW_LIMIT);
        assert_eq!(
            dashboard.recent_high_severity_violations.len(),
            RECENT_VIOLATION_LIMIT
        );
        assert_eq!(
            dashboard.recent_high_severity_violations[0].session_id,
            "s24"
        );
    }
}
