use thiserror::Error;

use crate::models::SessionStatus;

/// Every failure the engine reports to its immediate caller.
///
/// Nothing here is retried internally. `StaleFrame` and `SessionClosed` are
/// routine for a live feed; the caller decides whether to resend or skip.
#[derive(Debug, Error)]
pub enum ProctorError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("invalid settings: {0}")]
    Configuration(String),

    #[error("task {task_id} already has active session {existing_session_id} for student {student_id}")]
    DuplicateSession {
        task_id: String,
        student_id: String,
        existing_session_id: String,
    },

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {session_id} is {status} and no longer accepts frames")]
    SessionClosed {
        session_id: String,
        status: SessionStatus,
    },

    #[error("frame {frame_number} is not newer than last accepted frame {last_frame_number} for session {session_id}")]
    StaleFrame {
        session_id: String,
        frame_number: u64,
        last_frame_number: u64,
    },

    #[error("session {session_id} has already finished as {status}")]
    AlreadyEnded {
        session_id: String,
        status: SessionStatus,
    },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ProctorError {
    /// Frames rejected for these reasons are dropped, never fatal to a feed.
    pub fn is_frame_rejection(&self) -> bool {
        matches!(
            self,
            ProctorError::StaleFrame { .. } | ProctorError::Validation(_)
        )
    }
}

pub type ProctorResult<T> = Result<T, ProctorError>;
