use anyhow::{Context, Result};
use rusqlite::{params, Row, Transaction};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_severity, parse_violation_type, to_i64, to_u64},
};
use crate::models::Violation;

fn row_to_violation(row: &Row) -> Result<Violation> {
    let violation_type: String = row.get("violation_type")?;
    let severity: String = row.get("severity")?;
    let timestamp: String = row.get("timestamp")?;
    let details_json: String = row.get("details_json")?;

    Ok(Violation {
        id: row.get("id")?,
        violation_type: parse_violation_type(&violation_type)?,
        severity: parse_severity(&severity)?,
        confidence: row.get("confidence")?,
        frame_number: to_u64(row.get("frame_number")?, "frame_number")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        details: serde_json::from_str(&details_json).context("failed to parse details_json")?,
    })
}

pub(crate) fn insert_violation(
    tx: &Transaction<'_>,
    session_id: &str,
    violation: &Violation,
) -> Result<()> {
    tx.execute(
        "INSERT INTO violations (id, session_id, violation_type, severity, confidence,
             frame_number, timestamp, details_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            violation.id,
            session_id,
            violation.violation_type.as_str(),
            violation.severity.as_str(),
            violation.confidence,
            to_i64(violation.frame_number)?,
            violation.timestamp.to_rfc3339(),
            violation.details.to_string(),
        ],
    )
    .with_context(|| format!("failed to insert violation {}", violation.id))?;
    Ok(())
}

impl Database {
    /// Violations of a session in the order they were recorded.
    pub async fn get_violations_for_session(&self, session_id: &str) -> Result<Vec<Violation>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, violation_type, severity, confidence, frame_number, timestamp, details_json
                 FROM violations
                 WHERE session_id = ?1
                 ORDER BY frame_number ASC, rowid ASC",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut violations = Vec::new();
            while let Some(row) = rows.next()? {
                violations.push(row_to_violation(row)?);
            }
            Ok(violations)
        })
        .await
    }
}
