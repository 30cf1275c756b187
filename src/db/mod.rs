use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod connection;
mod helpers;
mod memory;
mod migrations;
pub mod models;
mod repositories;

pub use connection::Database;
pub use memory::MemoryStore;
pub use models::{FrameRecord, SessionRecord};

use crate::models::{SessionStatus, Violation};

/// Returned by `create_session` when the store already holds an active session
/// for the same task and student, possibly written by another registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id} already has active session {existing_session_id} for student {student_id}")]
pub struct ActiveSessionExists {
    pub task_id: String,
    pub student_id: String,
    pub existing_session_id: String,
}

/// Durable home of session records. The registry writes through this after it
/// has decided a frame's outcome and before it commits the outcome in memory.
pub trait SessionStore: Send + Sync + 'static {
    fn create_session(&self, record: &SessionRecord) -> impl Future<Output = Result<()>> + Send;

    /// Must apply the whole frame or nothing. Fails if the session is not
    /// active or the frame is not newer than the last one stored.
    fn record_frame(&self, frame: &FrameRecord) -> impl Future<Output = Result<()>> + Send;

    /// Returns false when the stored record had already left Active.
    fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        risk_score: u8,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn load_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Option<SessionRecord>>> + Send;

    fn load_violations(
        &self,
        session_id: &str,
    ) -> impl Future<Output = Result<Vec<Violation>>> + Send;

    fn sessions_with_status(
        &self,
        status: SessionStatus,
    ) -> impl Future<Output = Result<Vec<SessionRecord>>> + Send;

    fn mark_interrupted(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool>> + Send;
}

impl SessionStore for Database {
    async fn create_session(&self, record: &SessionRecord) -> Result<()> {
        self.insert_session(record).await
    }

    async fn record_frame(&self, frame: &FrameRecord) -> Result<()> {
        self.insert_frame(frame).await
    }

    async fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        risk_score: u8,
    ) -> Result<bool> {
        self.close_session_record(session_id, status, ended_at, risk_score)
            .await
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        self.get_session_record(session_id).await
    }

    async fn load_violations(&self, session_id: &str) -> Result<Vec<Violation>> {
        self.get_violations_for_session(session_id).await
    }

    async fn sessions_with_status(&self, status: SessionStatus) -> Result<Vec<SessionRecord>> {
        self.list_sessions_by_status(status).await
    }

    async fn mark_interrupted(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.mark_session_interrupted(session_id, at).await
    }
}

impl SessionStore for MemoryStore {
    async fn create_session(&self, record: &SessionRecord) -> Result<()> {
        self.insert_session(record)
    }

    async fn record_frame(&self, frame: &FrameRecord) -> Result<()> {
        self.insert_frame(frame)
    }

    async fn close_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        risk_score: u8,
    ) -> Result<bool> {
        Ok(self.finish_session(session_id, status, ended_at, Some(risk_score)))
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.get_session(session_id))
    }

    async fn load_violations(&self, session_id: &str) -> Result<Vec<Violation>> {
        Ok(self.get_violations(session_id))
    }

    async fn sessions_with_status(&self, status: SessionStatus) -> Result<Vec<SessionRecord>> {
        Ok(self.list_by_status(status))
    }

    async fn mark_interrupted(&self, session_id: &str, at: DateTime<Utc>) -> Result<bool> {
        Ok(self.finish_session(session_id, SessionStatus::Interrupted, at, None))
    }
}
