//! Per-frame observation delivered by the upstream detector.
//!
//! The engine never looks at pixels. Whatever runs face detection, gaze
//! estimation, object recognition and face verification reduces a frame to a
//! `Signal` before it crosses into the registry.

use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, ProctorResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    pub label: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    pub present: bool,
    pub face_count: u32,
    #[serde(default)]
    pub gaze_off_screen: bool,
    /// Share of recent frames spent looking away, as judged by the detector.
    #[serde(default)]
    pub gaze_pattern_score: f64,
    #[serde(default)]
    pub detected_objects: Vec<DetectedObject>,
    /// Similarity of the current face to the enrolment face, 1.0 = identical.
    #[serde(default = "default_identity_match_score")]
    pub identity_match_score: f64,
}

fn default_identity_match_score() -> f64 {
    1.0
}

impl Signal {
    /// One face, on screen, nothing suspicious.
    pub fn attentive() -> Self {
        Self {
            present: true,
            face_count: 1,
            gaze_off_screen: false,
            gaze_pattern_score: 0.0,
            detected_objects: Vec::new(),
            identity_match_score: 1.0,
        }
    }

    /// Nobody in front of the camera.
    pub fn absent() -> Self {
        Self {
            present: false,
            face_count: 0,
            ..Self::attentive()
        }
    }

    pub fn with_faces(mut self, face_count: u32) -> Self {
        self.face_count = face_count;
        self.present = face_count > 0;
        self
    }

    pub fn looking_away(mut self) -> Self {
        self.gaze_off_screen = true;
        self
    }

    pub fn with_gaze_pattern(mut self, score: f64) -> Self {
        self.gaze_pattern_score = score;
        self
    }

    pub fn with_object(mut self, label: impl Into<String>, confidence: f64) -> Self {
        self.detected_objects.push(DetectedObject {
            label: label.into(),
            confidence,
        });
        self
    }

    pub fn with_identity_score(mut self, score: f64) -> Self {
        self.identity_match_score = score;
        self
    }

    /// A reference frame is only useful for identity checks when it shows
    /// exactly one face.
    pub fn is_usable_reference(&self) -> bool {
        self.present && self.face_count == 1
    }

    pub fn validate(&self) -> ProctorResult<()> {
        if self.present && self.face_count == 0 {
            return Err(ProctorError::Validation(
                "present is true but faceCount is 0".into(),
            ));
        }
        if !self.present && self.face_count > 0 {
            return Err(ProctorError::Validation(format!(
                "present is false but faceCount is {}",
                self.face_count
            )));
        }

        check_unit_interval("gazePatternScore", self.gaze_pattern_score)?;
        check_unit_interval("identityMatchScore", self.identity_match_score)?;

        for object in &self.detected_objects {
            if object.label.trim().is_empty() {
                return Err(ProctorError::Validation(
                    "detected object has an empty label".into(),
                ));
            }
            check_unit_interval("detectedObjects.confidence", object.confidence)?;
        }

        Ok(())
    }
}

fn check_unit_interval(field: &str, value: f64) -> ProctorResult<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProctorError::Validation(format!(
            "{field} must be within [0, 1], got {value}"
        )))
    }
}
