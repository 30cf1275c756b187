use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViolationType {
    FaceAbsent,
    MultipleFaces,
    GazeAway,
    SuspiciousGazePattern,
    ObjectDetected,
    IdentityMismatch,
}

impl ViolationType {
    pub const ALL: [ViolationType; 6] = [
        ViolationType::FaceAbsent,
        ViolationType::MultipleFaces,
        ViolationType::GazeAway,
        ViolationType::SuspiciousGazePattern,
        ViolationType::ObjectDetected,
        ViolationType::IdentityMismatch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::FaceAbsent => "FaceAbsent",
            ViolationType::MultipleFaces => "MultipleFaces",
            ViolationType::GazeAway => "GazeAway",
            ViolationType::SuspiciousGazePattern => "SuspiciousGazePattern",
            ViolationType::ObjectDetected => "ObjectDetected",
            ViolationType::IdentityMismatch => "IdentityMismatch",
        }
    }

    /// Smoothed categories need a run of consecutive anomalous frames before
    /// they fire; the rest fire on the frame they are observed.
    pub fn is_smoothed(&self) -> bool {
        matches!(
            self,
            ViolationType::FaceAbsent
                | ViolationType::MultipleFaces
                | ViolationType::GazeAway
                | ViolationType::SuspiciousGazePattern
        )
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "Low",
            Severity::Medium => "Medium",
            Severity::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified rule breach. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub id: String,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub confidence: f64,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub details: serde_json::Value,
}

impl Violation {
    pub fn new(
        violation_type: ViolationType,
        severity: Severity,
        confidence: f64,
        frame_number: u64,
        timestamp: DateTime<Utc>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            violation_type,
            severity,
            confidence,
            frame_number,
            timestamp,
            details,
        }
    }
}
