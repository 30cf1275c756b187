use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{ffi, params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        parse_datetime, parse_optional_datetime, parse_status, to_i64, to_u32, to_u64,
    },
    models::{FrameRecord, SessionRecord},
    ActiveSessionExists,
};
use crate::models::SessionStatus;
use crate::risk::RiskCounters;
use crate::settings::Settings;

use super::violations::insert_violation;

const SESSION_COLUMNS: &str = "id, task_id, student_id, status, started_at, ended_at,
     last_frame_number, total_frames, present_frames, absent_frames, multi_face_frames,
     look_away_frames, high_count, medium_count, low_count, risk_score, settings_json,
     has_reference, updated_at";

fn row_to_session(row: &Row) -> Result<SessionRecord> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let updated_at: String = row.get("updated_at")?;
    let settings_json: String = row.get("settings_json")?;
    let risk_score: i64 = row.get("risk_score")?;

    let counters = RiskCounters {
        total_frames: to_u64(row.get("total_frames")?, "total_frames")?,
        present_frames: to_u64(row.get("present_frames")?, "present_frames")?,
        absent_frames: to_u64(row.get("absent_frames")?, "absent_frames")?,
        multi_face_frames: to_u64(row.get("multi_face_frames")?, "multi_face_frames")?,
        look_away_frames: to_u64(row.get("look_away_frames")?, "look_away_frames")?,
        high_count: to_u32(row.get("high_count")?, "high_count")?,
        medium_count: to_u32(row.get("medium_count")?, "medium_count")?,
        low_count: to_u32(row.get("low_count")?, "low_count")?,
    };

    let settings: Settings =
        serde_json::from_str(&settings_json).context("failed to parse settings_json")?;

    Ok(SessionRecord {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        student_id: row.get("student_id")?,
        status: parse_status(&status)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        last_frame_number: to_u64(row.get("last_frame_number")?, "last_frame_number")?,
        counters,
        risk_score: u8::try_from(risk_score)
            .with_context(|| format!("risk_score {risk_score} is out of range"))?,
        settings,
        has_reference: row.get("has_reference")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
        let record = record.clone();
        self.execute(move |conn| {
            let settings_json =
                serde_json::to_string(&record.settings).context("failed to encode settings")?;
            let counters = record.counters;
            let inserted = conn.execute(
                "INSERT INTO sessions (id, task_id, student_id, status, started_at, ended_at,
                     last_frame_number, total_frames, present_frames, absent_frames,
                     multi_face_frames, look_away_frames, high_count, medium_count, low_count,
                     risk_score, settings_json, has_reference, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                     ?16, ?17, ?18, ?19, ?19)",
                params![
                    record.id,
                    record.task_id,
                    record.student_id,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.last_frame_number)?,
                    to_i64(counters.total_frames)?,
                    to_i64(counters.present_frames)?,
                    to_i64(counters.absent_frames)?,
                    to_i64(counters.multi_face_frames)?,
                    to_i64(counters.look_away_frames)?,
                    counters.high_count,
                    counters.medium_count,
                    counters.low_count,
                    record.risk_score,
                    settings_json,
                    record.has_reference,
                    record.updated_at.to_rfc3339(),
                ],
            );

            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(failure, _))
                    if failure.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    // Only idx_sessions_one_active is a plain UNIQUE constraint.
                    let existing_session_id: String = conn
                        .query_row(
                            "SELECT id FROM sessions
                             WHERE task_id = ?1 AND student_id = ?2 AND status = 'Active'",
                            params![record.task_id, record.student_id],
                            |row| row.get(0),
                        )
                        .context("failed to read conflicting active session")?;
                    Err(ActiveSessionExists {
                        task_id: record.task_id.clone(),
                        student_id: record.student_id.clone(),
                        existing_session_id,
                    }
                    .into())
                }
                Err(err) => Err(anyhow::Error::new(err)
                    .context(format!("failed to insert session {}", record.id))),
            }
        })
        .await
    }

    /// Counters, status and violations of one frame land together or not at all.
    /// The frame-number guard makes a replayed or out-of-order write a no-op error.
    pub async fn insert_frame(&self, frame: &FrameRecord) -> Result<()> {
        let frame = frame.clone();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open frame transaction")?;
            let counters = frame.counters;

            let changed = tx.execute(
                "UPDATE sessions
                 SET last_frame_number = ?1,
                     total_frames = ?2,
                     present_frames = ?3,
                     absent_frames = ?4,
                     multi_face_frames = ?5,
                     look_away_frames = ?6,
                     high_count = ?7,
                     medium_count = ?8,
                     low_count = ?9,
                     risk_score = ?10,
                     status = ?11,
                     ended_at = COALESCE(?12, ended_at),
                     updated_at = ?13
                 WHERE id = ?14 AND status = 'Active' AND last_frame_number < ?1",
                params![
                    to_i64(frame.frame_number)?,
                    to_i64(counters.total_frames)?,
                    to_i64(counters.present_frames)?,
                    to_i64(counters.absent_frames)?,
                    to_i64(counters.multi_face_frames)?,
                    to_i64(counters.look_away_frames)?,
                    counters.high_count,
                    counters.medium_count,
                    counters.low_count,
                    frame.risk_score,
                    frame.status.as_str(),
                    frame.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    frame.recorded_at.to_rfc3339(),
                    frame.session_id,
                ],
            )?;

            if changed != 1 {
                bail!(
                    "session {} rejected frame {}: not active or frame already recorded",
                    frame.session_id,
                    frame.frame_number
                );
            }

            for violation in &frame.violations {
                insert_violation(&tx, &frame.session_id, violation)?;
            }

            tx.commit().context("failed to commit frame transaction")?;
            Ok(())
        })
        .await
    }

    /// Returns false when the session was no longer active.
    pub async fn close_session_record(
        &self,
        session_id: &str,
        status: SessionStatus,
        ended_at: DateTime<Utc>,
        risk_score: u8,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     ended_at = ?2,
                     risk_score = ?3,
                     updated_at = ?2
                 WHERE id = ?4 AND status = 'Active'",
                params![status.as_str(), ended_at.to_rfc3339(), risk_score, session_id],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    pub async fn get_session_record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let raw = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?;
            raw.transpose()
        })
        .await
    }

    pub async fn list_sessions_by_status(
        &self,
        status: SessionStatus,
    ) -> Result<Vec<SessionRecord>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = ?1 ORDER BY started_at ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![status.as_str()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn mark_session_interrupted(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = 'Interrupted',
                     ended_at = ?1,
                     updated_at = ?1
                 WHERE id = ?2 AND status = 'Active'",
                params![at.to_rfc3339(), session_id],
            )?;
            Ok(changed == 1)
        })
        .await
    }
}
