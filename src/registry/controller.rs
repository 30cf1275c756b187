use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex, PoisonError, RwLock},
    time::Instant,
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::{
    classifier::ViolationClassifier,
    db::{ActiveSessionExists, FrameRecord, SessionStore},
    error::{ProctorError, ProctorResult},
    log_debug, log_info, log_warn,
    metrics::{FrameMetrics, MetricsCollector, MetricsSnapshot},
    models::{SessionStatus, SessionSummary, Signal, StatusReport, Violation},
    policy::TerminationPolicy,
    risk::{risk_level, score, RiskAssessment, RiskLevel},
    settings::Settings,
};

use super::{
    dashboard::DashboardSnapshot,
    state::{current_conditions, SessionSnapshot, SessionState},
};

const ENABLE_LOGS: bool = true;

/// Outcome of one accepted frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub session_id: String,
    pub frame_number: u64,
    pub violations: Vec<Violation>,
    pub risk_score: u8,
    pub level: RiskLevel,
    pub terminated: bool,
    pub summary: Option<SessionSummary>,
}

struct SessionHandle {
    state: Mutex<SessionState>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl SessionHandle {
    fn new(state: SessionState) -> Self {
        let (snapshot, _) = watch::channel(state.snapshot());
        Self {
            state: Mutex::new(state),
            snapshot,
        }
    }

    fn publish(&self, state: &SessionState) {
        self.snapshot.send_replace(state.snapshot());
    }

    fn current(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }
}

type ActiveKey = (String, String);

struct RegistryInner<S> {
    store: S,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    active_keys: StdMutex<HashMap<ActiveKey, String>>,
    metrics: MetricsCollector,
}

/// Owns every live session. Each session has its own async lock; the index
/// lock is only held to look a handle up.
pub struct SessionRegistry<S: SessionStore> {
    inner: Arc<RegistryInner<S>>,
}

impl<S: SessionStore> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: SessionStore> SessionRegistry<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                store,
                sessions: RwLock::new(HashMap::new()),
                active_keys: StdMutex::new(HashMap::new()),
                metrics: MetricsCollector::new(),
            }),
        }
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub async fn create_session(
        &self,
        task_id: &str,
        student_id: &str,
        settings: Settings,
        reference: Option<&Signal>,
    ) -> ProctorResult<String> {
        if task_id.trim().is_empty() || student_id.trim().is_empty() {
            return Err(ProctorError::Validation(
                "task id and student id must not be empty".to_string(),
            ));
        }
        settings.validate()?;
        if let Some(reference) = reference {
            reference.validate()?;
        }
        let has_reference = reference.is_some_and(Signal::is_usable_reference);

        let session_id = Uuid::new_v4().to_string();
        let key = (task_id.to_string(), student_id.to_string());
        self.reserve_key(&key, &session_id)?;

        let state = SessionState::new(
            session_id.clone(),
            task_id.to_string(),
            student_id.to_string(),
            settings,
            has_reference,
            Utc::now(),
        );

        if let Err(err) = self.inner.store.create_session(&state.to_record()).await {
            self.release_key(&key, &session_id);
            // Another registry, or a run not yet recovered, owns the pair.
            return Err(match err.downcast::<ActiveSessionExists>() {
                Ok(existing) => ProctorError::DuplicateSession {
                    task_id: existing.task_id,
                    student_id: existing.student_id,
                    existing_session_id: existing.existing_session_id,
                },
                Err(err) => ProctorError::Storage(err),
            });
        }

        self.write_index()
            .insert(session_id.clone(), Arc::new(SessionHandle::new(state)));
        self.inner.metrics.record_session_created();

        log_info!(
            "session {} created for task {} student {} (reference: {})",
            session_id,
            task_id,
            student_id,
            has_reference
        );

        Ok(session_id)
    }

    pub async fn process_frame(
        &self,
        session_id: &str,
        frame_number: u64,
        signal: Signal,
        timestamp: DateTime<Utc>,
    ) -> ProctorResult<FrameResult> {
        let result = self
            .apply_frame(session_id, frame_number, &signal, timestamp)
            .await;

        if let Err(err) = &result {
            self.inner.metrics.record_rejection();
            if err.is_frame_rejection() {
                log_debug!("session {} dropped frame {}: {}", session_id, frame_number, err);
            } else {
                log_warn!("session {} refused frame {}: {}", session_id, frame_number, err);
            }
        }

        result
    }

    async fn apply_frame(
        &self,
        session_id: &str,
        frame_number: u64,
        signal: &Signal,
        timestamp: DateTime<Utc>,
    ) -> ProctorResult<FrameResult> {
        let Some(handle) = self.handle(session_id) else {
            return Err(match self.load_stored(session_id).await? {
                Some(stored) if !stored.status.is_active() => ProctorError::SessionClosed {
                    session_id: session_id.to_string(),
                    status: stored.status,
                },
                _ => ProctorError::NotFound(session_id.to_string()),
            });
        };

        let mut state = handle.state.lock().await;
        let started = Instant::now();

        if !state.status.is_active() {
            return Err(ProctorError::SessionClosed {
                session_id: session_id.to_string(),
                status: state.status,
            });
        }
        if frame_number <= state.last_frame_number {
            return Err(ProctorError::StaleFrame {
                session_id: session_id.to_string(),
                frame_number,
                last_frame_number: state.last_frame_number,
            });
        }
        signal.validate()?;

        let mut classifier_state = state.classifier;
        let classification = ViolationClassifier::new(&state.settings, state.has_reference)
            .classify(&mut classifier_state, frame_number, signal, timestamp);

        let mut counters = state.counters;
        counters.record_frame(&classification.conditions, &classification.violations);
        let risk_score = score(&counters);
        let level = risk_level(&counters);
        let terminated = TerminationPolicy::from_settings(&state.settings).evaluate(&counters);

        let frame = FrameRecord {
            session_id: session_id.to_string(),
            frame_number,
            counters,
            risk_score,
            status: if terminated {
                SessionStatus::Terminated
            } else {
                SessionStatus::Active
            },
            ended_at: terminated.then_some(timestamp),
            violations: classification.violations,
            recorded_at: Utc::now(),
        };
        self.inner.store.record_frame(&frame).await?;

        state.classifier = classifier_state;
        state.counters = counters;
        state.last_frame_number = frame_number;
        state.current = current_conditions(signal);
        state.violations.extend(frame.violations.iter().cloned());

        for violation in &frame.violations {
            log_warn!(
                "session {} frame {}: {} ({}, confidence {:.2})",
                session_id,
                frame_number,
                violation.violation_type,
                violation.severity,
                violation.confidence
            );
        }

        let summary = if terminated {
            let summary = state.close(SessionStatus::Terminated, timestamp);
            self.release_key(&(state.task_id.clone(), state.student_id.clone()), session_id);
            log_warn!(
                "session {} terminated at frame {} after {} high-severity violations",
                session_id,
                frame_number,
                counters.high_count
            );
            Some(summary)
        } else {
            None
        };

        handle.publish(&state);
        drop(state);

        self.inner.metrics.record_frame(FrameMetrics {
            processing_micros: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
            violations: u32::try_from(frame.violations.len()).unwrap_or(u32::MAX),
            terminated,
        });

        Ok(FrameResult {
            session_id: session_id.to_string(),
            frame_number,
            violations: frame.violations,
            risk_score,
            level,
            terminated,
            summary,
        })
    }

    pub async fn end_session(&self, session_id: &str) -> ProctorResult<SessionSummary> {
        let Some(handle) = self.handle(session_id) else {
            return Err(match self.load_stored(session_id).await? {
                Some(stored) if !stored.status.is_active() => ProctorError::AlreadyEnded {
                    session_id: session_id.to_string(),
                    status: stored.status,
                },
                _ => ProctorError::NotFound(session_id.to_string()),
            });
        };

        let mut state = handle.state.lock().await;
        if !state.status.is_active() {
            return Err(ProctorError::AlreadyEnded {
                session_id: session_id.to_string(),
                status: state.status,
            });
        }

        let ended_at = Utc::now();
        let closed = self
            .inner
            .store
            .close_session(session_id, SessionStatus::Ended, ended_at, state.risk_score())
            .await?;
        if !closed {
            return Err(ProctorError::Storage(anyhow!(
                "stored record for session {session_id} is no longer active"
            )));
        }

        let summary = state.close(SessionStatus::Ended, ended_at);
        self.release_key(&(state.task_id.clone(), state.student_id.clone()), session_id);
        handle.publish(&state);

        log_info!(
            "session {} ended: score {} ({}) over {} frames",
            session_id,
            summary.risk_score,
            summary.level,
            summary.total_frames
        );

        Ok(summary)
    }

    pub async fn get_status(&self, session_id: &str) -> ProctorResult<StatusReport> {
        Ok(self.snapshot_of(session_id).await?.status_report())
    }

    pub async fn get_risk_assessment(&self, session_id: &str) -> ProctorResult<RiskAssessment> {
        Ok(self.snapshot_of(session_id).await?.risk_assessment())
    }

    /// Frozen summary of a closed session; `None` while it is still active.
    pub async fn get_summary(&self, session_id: &str) -> ProctorResult<Option<SessionSummary>> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle.state.lock().await.summary.clone());
        }
        Ok(self.require_stored(session_id).await?.summary)
    }

    pub async fn violations(&self, session_id: &str) -> ProctorResult<Vec<Violation>> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle.state.lock().await.violations.clone());
        }
        Ok(self.require_stored(session_id).await?.violations)
    }

    /// Snapshot stream of a session held in memory.
    pub fn subscribe(&self, session_id: &str) -> ProctorResult<watch::Receiver<SessionSnapshot>> {
        self.handle(session_id)
            .map(|handle| handle.snapshot.subscribe())
            .ok_or_else(|| ProctorError::NotFound(session_id.to_string()))
    }

    pub fn dashboard(&self) -> DashboardSnapshot {
        let snapshots: Vec<SessionSnapshot> = self
            .handles()
            .iter()
            .map(|handle| handle.current())
            .collect();
        DashboardSnapshot::from_snapshots(&snapshots)
    }

    /// Drop closed sessions from memory. Their records stay in the store.
    pub fn purge_closed(&self) -> usize {
        let mut sessions = self.write_index();
        let before = sessions.len();
        sessions.retain(|_, handle| handle.current().status.is_active());
        let purged = before - sessions.len();
        if purged > 0 {
            log_info!("purged {} closed sessions from memory", purged);
        }
        purged
    }

    /// Mark stored sessions that are still active but unknown to this registry
    /// as interrupted. Returns the ids that were marked.
    pub async fn recover_interrupted(&self) -> ProctorResult<Vec<String>> {
        let orphans: Vec<String> = self
            .inner
            .store
            .sessions_with_status(SessionStatus::Active)
            .await?
            .into_iter()
            .map(|record| record.id)
            .filter(|id| self.handle(id).is_none())
            .collect();

        let mut recovered = Vec::with_capacity(orphans.len());
        let now = Utc::now();
        for session_id in orphans {
            if self.inner.store.mark_interrupted(&session_id, now).await? {
                log_warn!("session {} was left active and is now interrupted", session_id);
                recovered.push(session_id);
            }
        }
        Ok(recovered)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.get_snapshot()
    }

    fn handle(&self, session_id: &str) -> Option<Arc<SessionHandle>> {
        self.read_index().get(session_id).cloned()
    }

    fn handles(&self) -> Vec<Arc<SessionHandle>> {
        self.read_index().values().cloned().collect()
    }

    fn read_index(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        self.inner
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<SessionHandle>>> {
        self.inner
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve_key(&self, key: &ActiveKey, session_id: &str) -> ProctorResult<()> {
        let mut keys = self
            .inner
            .active_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = keys.get(key) {
            return Err(ProctorError::DuplicateSession {
                task_id: key.0.clone(),
                student_id: key.1.clone(),
                existing_session_id: existing.clone(),
            });
        }
        keys.insert(key.clone(), session_id.to_string());
        Ok(())
    }

    fn release_key(&self, key: &ActiveKey, session_id: &str) {
        let mut keys = self
            .inner
            .active_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if keys.get(key).is_some_and(|owner| owner == session_id) {
            keys.remove(key);
        }
    }

    async fn snapshot_of(&self, session_id: &str) -> ProctorResult<SessionSnapshot> {
        if let Some(handle) = self.handle(session_id) {
            return Ok(handle.current());
        }
        Ok(self.require_stored(session_id).await?.snapshot())
    }

    async fn load_stored(&self, session_id: &str) -> ProctorResult<Option<SessionState>> {
        let Some(record) = self.inner.store.load_session(session_id).await? else {
            return Ok(None);
        };
        let violations = self.inner.store.load_violations(session_id).await?;
        Ok(Some(SessionState::from_record(record, violations)))
    }

    async fn require_stored(&self, session_id: &str) -> ProctorResult<SessionState> {
        self.load_stored(session_id)
            .await?
            .ok_or_else(|| ProctorError::NotFound(session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Severity, ViolationType};

    fn registry() -> SessionRegistry<MemoryStore> {
        SessionRegistry::new(MemoryStore::new())
    }

    fn at(frame: u64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(frame as i64)
    }

    fn terminating_settings() -> Settings {
        let mut settings = Settings::default();
        settings.max_multiple_face_frames = 1;
        settings.auto_terminate = true;
        settings.auto_terminate_threshold = 3;
        settings
    }

    #[tokio::test]
    async fn test_absence_fires_once_at_threshold_and_rearms() {
        let registry = registry();
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        for frame in 1..=29 {
            let result = registry
                .process_frame(&id, frame, Signal::absent(), at(frame))
                .await
                .unwrap();
            assert!(result.violations.is_empty(), "frame {frame} fired early");
        }

        let result = registry
            .process_frame(&id, 30, Signal::absent(), at(30))
            .await
            .unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].violation_type, ViolationType::FaceAbsent);
        assert_eq!(result.violations[0].severity, Severity::Medium);

        for frame in 31..=40 {
            let result = registry
                .process_frame(&id, frame, Signal::absent(), at(frame))
                .await
                .unwrap();
            assert!(result.violations.is_empty());
        }

        registry
            .process_frame(&id, 41, Signal::attentive(), at(41))
            .await
            .unwrap();
        for frame in 42..=70 {
            let result = registry
                .process_frame(&id, frame, Signal::absent(), at(frame))
                .await
                .unwrap();
            assert!(result.violations.is_empty());
        }
        let result = registry
            .process_frame(&id, 71, Signal::absent(), at(71))
            .await
            .unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(registry.violations(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_third_high_violation_terminates() {
        let registry = registry();
        let id = registry
            .create_session("task", "student", terminating_settings(), None)
            .await
            .unwrap();

        let crowd = || Signal::attentive().with_faces(2);
        let mut frame = 0;
        for expected_high in 1..=3u32 {
            frame += 1;
            let result = registry
                .process_frame(&id, frame, crowd(), at(frame))
                .await
                .unwrap();
            assert_eq!(result.violations.len(), 1);
            assert_eq!(result.terminated, expected_high == 3);
            if !result.terminated {
                frame += 1;
                registry
                    .process_frame(&id, frame, Signal::attentive(), at(frame))
                    .await
                    .unwrap();
            } else {
                let summary = result.summary.expect("terminating frame carries summary");
                assert_eq!(summary.status, SessionStatus::Terminated);
                assert_eq!(summary.severity_counts.high, 3);
            }
        }

        let status = registry.get_status(&id).await.unwrap();
        assert_eq!(status.status, SessionStatus::Terminated);

        let err = registry
            .process_frame(&id, frame + 1, Signal::attentive(), at(frame + 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ProctorError::SessionClosed {
                status: SessionStatus::Terminated,
                ..
            }
        ));
        assert!(matches!(
            registry.end_session(&id).await.unwrap_err(),
            ProctorError::AlreadyEnded { .. }
        ));
        assert_eq!(registry.metrics().sessions_terminated, 1);
    }

    #[tokio::test]
    async fn test_stale_and_invalid_frames_do_not_mutate() {
        let registry = registry();
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        registry
            .process_frame(&id, 5, Signal::absent(), at(5))
            .await
            .unwrap();
        let before = registry.get_status(&id).await.unwrap();

        for frame in [5, 3] {
            let err = registry
                .process_frame(&id, frame, Signal::absent(), at(frame))
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ProctorError::StaleFrame {
                    last_frame_number: 5,
                    ..
                }
            ));
        }

        let mut malformed = Signal::attentive();
        malformed.gaze_pattern_score = f64::NAN;
        let err = registry
            .process_frame(&id, 6, malformed, at(6))
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::Validation(_)));

        assert_eq!(registry.get_status(&id).await.unwrap(), before);
        assert_eq!(registry.metrics().frames_rejected, 3);

        let stored = registry.store().get_session(&id).unwrap();
        assert_eq!(stored.last_frame_number, 5);
        assert_eq!(stored.counters.total_frames, 1);
    }

    #[tokio::test]
    async fn test_duplicate_active_session_is_refused_until_closed() {
        let registry = registry();
        let first = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        match registry
            .create_session("task", "student", Settings::default(), None)
            .await
        {
            Err(ProctorError::DuplicateSession {
                existing_session_id,
                ..
            }) => assert_eq!(existing_session_id, first),
            other => panic!("expected duplicate session error, got {other:?}"),
        }

        registry
            .create_session("task", "other-student", Settings::default(), None)
            .await
            .unwrap();

        registry.end_session(&first).await.unwrap();
        let second = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_across_registries_sharing_a_store() {
        let store = MemoryStore::new();
        let first_registry = SessionRegistry::new(store.clone());
        let second_registry = SessionRegistry::new(store);

        let first = first_registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        match second_registry
            .create_session("task", "student", Settings::default(), None)
            .await
        {
            Err(ProctorError::DuplicateSession {
                task_id,
                student_id,
                existing_session_id,
            }) => {
                assert_eq!(task_id, "task");
                assert_eq!(student_id, "student");
                assert_eq!(existing_session_id, first);
            }
            other => panic!("expected duplicate session error, got {other:?}"),
        }

        // The failed attempt left no reservation behind in the second registry.
        assert_eq!(second_registry.dashboard().total_sessions, 0);
        first_registry.end_session(&first).await.unwrap();
        second_registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_session_rejects_bad_input() {
        let registry = registry();

        let mut settings = Settings::default();
        settings.max_absent_frames = 0;
        assert!(matches!(
            registry
                .create_session("task", "student", settings, None)
                .await
                .unwrap_err(),
            ProctorError::Configuration(_)
        ));

        let mut reference = Signal::attentive();
        reference.face_count = 0;
        assert!(matches!(
            registry
                .create_session("task", "student", Settings::default(), Some(&reference))
                .await
                .unwrap_err(),
            ProctorError::Validation(_)
        ));

        let err = registry
            .create_session(" ", "student", Settings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ProctorError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "invalid input: task id and student id must not be empty"
        );

        // Failed creations must not hold the slot.
        registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_identity_mismatch_requires_usable_reference() {
        let registry = registry();
        let mut settings = Settings::default();
        settings.enabled.identity_mismatch = true;

        let with_reference = registry
            .create_session("task", "a", settings.clone(), Some(&Signal::attentive()))
            .await
            .unwrap();
        let without_reference = registry
            .create_session("task", "b", settings, Some(&Signal::absent()))
            .await
            .unwrap();

        let impostor = || Signal::attentive().with_identity_score(0.2);
        let result = registry
            .process_frame(&with_reference, 1, impostor(), at(1))
            .await
            .unwrap();
        assert_eq!(result.violations.len(), 1);
        assert_eq!(
            result.violations[0].violation_type,
            ViolationType::IdentityMismatch
        );
        assert!((result.violations[0].confidence - 0.8).abs() < 1e-9);

        let result = registry
            .process_frame(&without_reference, 1, impostor(), at(1))
            .await
            .unwrap();
        assert!(result.violations.is_empty());
    }

    #[tokio::test]
    async fn test_end_session_freezes_summary_and_reads_survive_purge() {
        let registry = registry();
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
        for frame in 1..=30 {
            let signal = if frame <= 15 {
                Signal::absent()
            } else {
                Signal::attentive()
            };
            registry
                .process_frame(&id, frame, signal, at(frame))
                .await
                .unwrap();
        }

        assert!(registry.get_summary(&id).await.unwrap().is_none());
        let summary = registry.end_session(&id).await.unwrap();
        assert_eq!(summary.total_frames, 30);
        assert_eq!(summary.risk_score, 15);
        assert_eq!(summary.level, RiskLevel::Low);
        assert_eq!(summary.category_counts[&ViolationType::FaceAbsent], 0);

        assert_eq!(registry.purge_closed(), 1);
        assert_eq!(registry.dashboard().total_sessions, 0);
        assert!(registry.subscribe(&id).is_err());

        let assessment = registry.get_risk_assessment(&id).await.unwrap();
        assert_eq!(assessment.score, 15);
        let status = registry.get_status(&id).await.unwrap();
        assert_eq!(status.status, SessionStatus::Ended);
        let stored_summary = registry.get_summary(&id).await.unwrap().unwrap();
        assert_eq!(stored_summary.risk_score, summary.risk_score);

        assert!(matches!(
            registry
                .process_frame(&id, 31, Signal::attentive(), at(31))
                .await
                .unwrap_err(),
            ProctorError::SessionClosed { .. }
        ));
        assert!(matches!(
            registry.end_session(&id).await.unwrap_err(),
            ProctorError::AlreadyEnded { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let registry = registry();
        assert!(matches!(
            registry
                .process_frame("missing", 1, Signal::attentive(), at(1))
                .await
                .unwrap_err(),
            ProctorError::NotFound(_)
        ));
        assert!(matches!(
            registry.end_session("missing").await.unwrap_err(),
            ProctorError::NotFound(_)
        ));
        assert!(matches!(
            registry.get_status("missing").await.unwrap_err(),
            ProctorError::NotFound(_)
        ));
        assert!(matches!(
            registry.get_risk_assessment("missing").await.unwrap_err(),
            ProctorError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_subscribers_see_each_committed_frame() {
        let registry = registry();
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
        let mut updates = registry.subscribe(&id).unwrap();

        registry
            .process_frame(&id, 1, Signal::attentive().looking_away(), at(1))
            .await
            .unwrap();
        updates.changed().await.unwrap();
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.last_frame_number, 1);
        assert!(snapshot.current.looking_away);
        assert_eq!(snapshot.counters.look_away_frames, 1);
    }

    #[tokio::test]
    async fn test_recover_marks_orphaned_active_records() {
        let store = MemoryStore::new();
        let crashed = SessionRegistry::new(store.clone());
        let orphan = crashed
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        let restarted = SessionRegistry::new(store.clone());
        let live = restarted
            .create_session("task", "other", Settings::default(), None)
            .await
            .unwrap();

        let recovered = restarted.recover_interrupted().await.unwrap();
        assert_eq!(recovered, vec![orphan.clone()]);
        assert_eq!(
            store.get_session(&orphan).unwrap().status,
            SessionStatus::Interrupted
        );
        assert_eq!(store.get_session(&live).unwrap().status, SessionStatus::Active);
        assert!(restarted.recover_interrupted().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_reflects_closed_high_risk_sessions() {
        let registry = registry();
        let risky = registry
            .create_session("task", "risky", terminating_settings(), None)
            .await
            .unwrap();
        registry
            .create_session("task", "calm", Settings::default(), None)
            .await
            .unwrap();

        let mut frame = 0;
        loop {
            frame += 1;
            let result = registry
                .process_frame(&risky, frame, Signal::attentive().with_faces(3), at(frame))
                .await
                .unwrap();
            if result.terminated {
                break;
            }
            frame += 1;
            registry
                .process_frame(&risky, frame, Signal::attentive(), at(frame))
                .await
                .unwrap();
        }

        let dashboard = registry.dashboard();
        assert_eq!(dashboard.total_sessions, 2);
        assert_eq!(dashboard.active_sessions, 1);
        assert_eq!(dashboard.high_risk_sessions, 1);
        assert_eq!(dashboard.sessions_needing_review.len(), 1);
        assert_eq!(dashboard.sessions_needing_review[0].session_id, risky);
        assert_eq!(dashboard.recent_high_severity_violations.len(), 3);
    }

    #[tokio::test]
    async fn test_sessions_progress_concurrently() {
        let registry = registry();
        let mut tasks = Vec::new();
        for student in 0..8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let id = registry
                    .create_session("task", &format!("student-{student}"), Settings::default(), None)
                    .await
                    .unwrap();
                for frame in 1..=40 {
                    registry
                        .process_frame(&id, frame, Signal::absent(), at(frame))
                        .await
                        .unwrap();
                }
                registry.end_session(&id).await.unwrap()
            }));
        }

        for task in tasks {
            let summary = task.await.unwrap();
            assert_eq!(summary.total_frames, 40);
            assert_eq!(summary.category_counts[&ViolationType::FaceAbsent], 1);
        }
        assert_eq!(registry.metrics().frames_processed, 8 * 40);
    }
}
