use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::classifier::ClassifierState;
use crate::db::SessionRecord;
use crate::models::{
    count_by_category, CurrentConditions, SessionStatus, SessionSummary, Severity, Signal,
    StatusReport, Violation,
};
use crate::risk::{risk_level, score, RiskAssessment, RiskCounters, RiskLevel};
use crate::settings::Settings;

/// High-severity violations a snapshot carries for the dashboard feed.
pub const RECENT_HIGH_LIMIT: usize = 10;

/// Live state of one session. Only the registry's per-session lock hands out
/// mutable access.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub task_id: String,
    pub student_id: String,
    pub settings: Settings,
    pub has_reference: bool,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_frame_number: u64,
    pub classifier: ClassifierState,
    pub counters: RiskCounters,
    pub current: CurrentConditions,
    pub violations: Vec<Violation>,
    pub summary: Option<SessionSummary>,
}

impl SessionState {
    pub fn new(
        id: String,
        task_id: String,
        student_id: String,
        settings: Settings,
        has_reference: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            task_id,
            student_id,
            settings,
            has_reference,
            status: SessionStatus::Active,
            started_at,
            ended_at: None,
            last_frame_number: 0,
            classifier: ClassifierState::default(),
            counters: RiskCounters::default(),
            current: CurrentConditions::default(),
            violations: Vec::new(),
            summary: None,
        }
    }

    /// Rebuild a closed session from storage so its summary can be served
    /// after it left memory.
    pub fn from_record(record: SessionRecord, violations: Vec<Violation>) -> Self {
        let mut state = Self {
            id: record.id,
            task_id: record.task_id,
            student_id: record.student_id,
            settings: record.settings,
            has_reference: record.has_reference,
            status: record.status,
            started_at: record.started_at,
            ended_at: record.ended_at,
            last_frame_number: record.last_frame_number,
            classifier: ClassifierState::default(),
            counters: record.counters,
            current: CurrentConditions::default(),
            violations,
            summary: None,
        };
        if !state.status.is_active() {
            state.summary = Some(state.build_summary(state.ended_at.unwrap_or(record.updated_at)));
        }
        state
    }

    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id.clone(),
            task_id: self.task_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at: self.ended_at,
            last_frame_number: self.last_frame_number,
            counters: self.counters,
            risk_score: self.risk_score(),
            settings: self.settings.clone(),
            has_reference: self.has_reference,
            updated_at: self.ended_at.unwrap_or(self.started_at),
        }
    }

    pub fn risk_score(&self) -> u8 {
        score(&self.counters)
    }

    /// Move to a terminal status and freeze the summary.
    pub fn close(&mut self, status: SessionStatus, ended_at: DateTime<Utc>) -> SessionSummary {
        self.status = status;
        self.ended_at = Some(ended_at);
        let summary = self.build_summary(ended_at);
        self.summary = Some(summary.clone());
        summary
    }

    fn build_summary(&self, ended_at: DateTime<Utc>) -> SessionSummary {
        let risk_score = self.risk_score();
        let duration_secs = (ended_at - self.started_at)
            .to_std()
            .map(|duration| duration.as_secs_f64())
            .unwrap_or(0.0);

        SessionSummary {
            session_id: self.id.clone(),
            task_id: self.task_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status,
            started_at: self.started_at,
            ended_at,
            duration_secs,
            total_frames: self.counters.total_frames,
            risk_score,
            level: risk_level(&self.counters),
            severity_counts: self.counters.severity_breakdown(),
            category_counts: count_by_category(&self.violations),
            statistics: self.counters.statistics(),
            violations: self.violations.clone(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let risk_score = self.risk_score();
        let mut recent_high: Vec<Violation> = self
            .violations
            .iter()
            .rev()
            .filter(|violation| violation.severity == Severity::High)
            .take(RECENT_HIGH_LIMIT)
            .cloned()
            .collect();
        recent_high.reverse();

        SessionSnapshot {
            session_id: self.id.clone(),
            task_id: self.task_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status,
            risk_score,
            level: risk_level(&self.counters),
            counters: self.counters,
            last_frame_number: self.last_frame_number,
            started_at: self.started_at,
            ended_at: self.ended_at,
            current: self.current,
            recent_high_violations: recent_high,
        }
    }
}

/// What a signal says about the candidate right now, regardless of toggles.
pub fn current_conditions(signal: &Signal) -> CurrentConditions {
    CurrentConditions {
        face_detected: signal.present,
        multiple_faces: signal.face_count > 1,
        looking_away: signal.present && signal.gaze_off_screen,
    }
}

/// Published after every committed change. Readers never touch the session lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub task_id: String,
    pub student_id: String,
    pub status: SessionStatus,
    pub risk_score: u8,
    pub level: RiskLevel,
    pub counters: RiskCounters,
    pub last_frame_number: u64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current: CurrentConditions,
    pub recent_high_violations: Vec<Violation>,
}

impl SessionSnapshot {
    pub fn status_report(&self) -> StatusReport {
        StatusReport {
            session_id: self.session_id.clone(),
            task_id: self.task_id.clone(),
            student_id: self.student_id.clone(),
            status: self.status,
            risk_score: self.risk_score,
            level: self.level,
            violation_count: self.counters.violation_count(),
            total_frames: self.counters.total_frames,
            last_frame_number: self.last_frame_number,
            started_at: self.started_at,
            current: self.current,
        }
    }

    pub fn risk_assessment(&self) -> RiskAssessment {
        RiskAssessment::from_counters(&self.session_id, &self.counters)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::models::ViolationType;

    fn state() -> SessionState {
        SessionState::new(
            "s".into(),
            "t".into(),
            "u".into(),
            Settings::default(),
            false,
            Utc::now(),
        )
    }

    #[test]
    fn test_close_freezes_summary() {
        let mut state = state();
        state.counters.total_frames = 30;
        state.counters.absent_frames = 15;
        let ended_at = state.started_at + Duration::seconds(90);

        let summary = state.close(SessionStatus::Ended, ended_at);

        assert_eq!(summary.status, SessionStatus::Ended);
        assert_eq!(summary.risk_score, 15);
        assert_eq!(summary.level, RiskLevel::Low);
        assert!((summary.duration_secs - 90.0).abs() < f64::EPSILON);
        assert_eq!(summary.category_counts.len(), ViolationType::ALL.len());
        assert_eq!(state.summary.as_ref(), Some(&summary));
    }

    #[test]
    fn test_snapshot_keeps_latest_high_violations() {
        let mut state = state();
        for frame in 1..=12u64 {
            state.violations.push(Violation::new(
                ViolationType::MultipleFaces,
                Severity::High,
                0.85,
                frame,
                Utc::now(),
                json!({}),
            ));
        }
        state.violations.push(Violation::new(
            ViolationType::GazeAway,
            Severity::Low,
            0.7,
            13,
            Utc::now(),
            json!({}),
        ));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.recent_high_violations.len(), RECENT_HIGH_LIMIT);
        assert_eq!(snapshot.recent_high_violations[0].frame_number, 3);
        assert_eq!(snapshot.recent_high_violations[9].frame_number, 12);
    }

    #[test]
    fn test_current_conditions_ignore_toggles() {
        let conditions = current_conditions(&Signal::attentive().with_faces(2).looking_away());
        assert!(conditions.face_detected);
        assert!(conditions.multiple_faces);
        assert!(conditions.looking_away);

        let absent = current_conditions(&Signal::absent());
        assert!(!absent.face_detected);
        assert!(!absent.looking_away);
    }
}
