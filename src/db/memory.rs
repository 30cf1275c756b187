use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{FrameRecord, SessionRecord};
use crate::db::ActiveSessionExists;
use crate::models::{SessionStatus, Violation};

#[derive(Debug, Clone)]
struct StoredSession {
    record: SessionRecord,
    violations: Vec<Violation>,
}

/// Process-local store with the same acceptance rules as the SQLite one.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    sessions: Arc<Mutex<HashMap<String, StoredSession>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StoredSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.lock();
        if sessions.contains_key(&record.id) {
            bail!("session {} already exists", record.id);
        }
        if record.status.is_active() {
            if let Some(existing) = sessions.values().find(|stored| {
                stored.record.status.is_active()
                    && stored.record.task_id == record.task_id
                    && stored.record.student_id == record.student_id
            }) {
                return Err(ActiveSessionExists {
                    task_id: record.task_id.clone(),
                    student_id: record.student_id.clone(),
                    existing_session_id: existing.record.id.clone(),
                }
                .into());
            }
        }
        sessions.insert(
            record.id.clone(),
            StoredSession {
                record: record.clone(),
                violations: Vec::new(),
            },
        );
        Ok(())
    }

    pub fn insert_frame(&self, frame: &FrameRecord) -> Result<()> {
        let mut sessions = self.lock();
        let Some(stored) = sessions.get_mut(&frame.session_id) else {
            bail!("session {} does not exist", frame.session_id);
        };
        if !stored.record.status.is_active() || stored.record.last_frame_number >= frame.frame_number
        {
            bail!(
                "session {} rejected frame {}: not active or frame already recorded",
                frame.session_id,
                frame.frame_number
            );
        }

        let record = &mut stored.record;
        record.last_frame_number = frame.frame_number;
        record.counters = frame.counters;
        record.risk_score = frame.risk_score;
        record.status = frame.status;
        if frame.ended_at.is_some() {
            record.ended_at = frame.ended_at;
        }
        record.updated_at = frame.recorded_at;
        stored.violations.extend(frame.violations.iter().cloned());
        Ok(())
    }

    pub fn finish_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        risk_score: Option<u8>,
    ) -> bool {
        let mut sessions = self.lock();
        match sessions.get_mut(session_id) {
            Some(stored) if stored.record.status.is_active() => {
                stored.record.status = status;
                stored.record.ended_at = Some(ended_at);
                stored.record.updated_at = ended_at;
                if let Some(score) = risk_score {
                    stored.record.risk_score = score;
                }
                true
            }
            _ => false,
        }
    }

    pub fn get_session(&self, session_id: &str) -> Option<SessionRecord> {
        self.lock()
            .get(session_id)
            .map(|stored| stored.record.clone())
    }

    pub fn get_violations(&self, session_id: &str) -> Vec<Violation> {
        self.lock()
            .get(session_id)
            .map(|stored| stored.violations.clone())
            .unwrap_or_default()
    }

    pub fn list_by_status(&self, status: SessionStatus) -> Vec<SessionRecord> {
        let mut records: Vec<SessionRecord> = self
            .lock()
            .values()
            .filter(|stored| stored.record.status == status)
            .map(|stored| stored.record.clone())
            .collect();
        records.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        records
    }
}
