use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::classifier::debounce::DebounceTracker;
use crate::models::{DetectedObject, Signal, Violation, ViolationType};
use crate::settings::Settings;

const FACE_ABSENT_CONFIDENCE: f64 = 0.9;
const MULTIPLE_FACES_CONFIDENCE: f64 = 0.85;
const GAZE_CONFIDENCE: f64 = 0.7;

/// Run counters for the smoothed categories of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierState {
    pub face_absent: DebounceTracker,
    pub multiple_faces: DebounceTracker,
    pub gaze_away: DebounceTracker,
    pub gaze_pattern: DebounceTracker,
}

impl ClassifierState {
    pub fn tracker(&self, violation_type: ViolationType) -> Option<&DebounceTracker> {
        match violation_type {
            ViolationType::FaceAbsent => Some(&self.face_absent),
            ViolationType::MultipleFaces => Some(&self.multiple_faces),
            ViolationType::GazeAway => Some(&self.gaze_away),
            ViolationType::SuspiciousGazePattern => Some(&self.gaze_pattern),
            ViolationType::ObjectDetected | ViolationType::IdentityMismatch => None,
        }
    }

    fn tracker_mut(&mut self, violation_type: ViolationType) -> Option<&mut DebounceTracker> {
        match violation_type {
            ViolationType::FaceAbsent => Some(&mut self.face_absent),
            ViolationType::MultipleFaces => Some(&mut self.multiple_faces),
            ViolationType::GazeAway => Some(&mut self.gaze_away),
            ViolationType::SuspiciousGazePattern => Some(&mut self.gaze_pattern),
            ViolationType::ObjectDetected | ViolationType::IdentityMismatch => None,
        }
    }
}

/// Conditions observed on a single frame, restricted to enabled categories.
/// These feed the per-category frame tallies of the risk score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameConditions {
    pub face_present: bool,
    pub face_absent: bool,
    pub multiple_faces: bool,
    pub looking_away: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub violations: Vec<Violation>,
    pub conditions: FrameConditions,
}

/// Turns one frame's signal into violations, advancing the session's run
/// counters in place.
pub struct ViolationClassifier<'a> {
    settings: &'a Settings,
    has_reference: bool,
}

impl<'a> ViolationClassifier<'a> {
    pub fn new(settings: &'a Settings, has_reference: bool) -> Self {
        Self {
            settings,
            has_reference,
        }
    }

    pub fn classify(
        &self,
        state: &mut ClassifierState,
        frame_number: u64,
        signal: &Signal,
        timestamp: DateTime<Utc>,
    ) -> Classification {
        let enabled = &self.settings.enabled;
        let mut violations = Vec::new();

        let smoothed = [
            (ViolationType::FaceAbsent, !signal.present),
            (ViolationType::MultipleFaces, signal.face_count > 1),
            (
                ViolationType::GazeAway,
                signal.present && signal.gaze_off_screen,
            ),
            (
                ViolationType::SuspiciousGazePattern,
                signal.present && signal.gaze_pattern_score > self.settings.gaze_pattern_threshold,
            ),
        ];

        for (violation_type, anomalous) in smoothed {
            let (Some(tracker), Some(threshold)) = (
                state.tracker_mut(violation_type),
                self.settings.frame_threshold(violation_type),
            ) else {
                continue;
            };

            if !enabled.is_enabled(violation_type) {
                tracker.reset();
                continue;
            }

            if let Some(run) = tracker.observe(anomalous, threshold) {
                violations.push(self.smoothed_violation(
                    violation_type,
                    run,
                    signal,
                    frame_number,
                    timestamp,
                ));
            }
        }

        if enabled.object_detected {
            if let Some(violation) = self.object_violation(signal, frame_number, timestamp) {
                violations.push(violation);
            }
        }

        if enabled.identity_mismatch {
            if let Some(violation) = self.identity_violation(signal, frame_number, timestamp) {
                violations.push(violation);
            }
        }

        let conditions = FrameConditions {
            face_present: signal.present,
            face_absent: enabled.face_absent && !signal.present,
            multiple_faces: enabled.multiple_faces && signal.face_count > 1,
            looking_away: enabled.gaze_away && signal.present && signal.gaze_off_screen,
        };

        Classification {
            violations,
            conditions,
        }
    }

    fn smoothed_violation(
        &self,
        violation_type: ViolationType,
        run: u32,
        signal: &Signal,
        frame_number: u64,
        timestamp: DateTime<Utc>,
    ) -> Violation {
        let (confidence, details) = match violation_type {
            ViolationType::MultipleFaces => (
                MULTIPLE_FACES_CONFIDENCE,
                json!({ "consecutiveFrames": run, "faceCount": signal.face_count }),
            ),
            ViolationType::GazeAway => (GAZE_CONFIDENCE, json!({ "consecutiveFrames": run })),
            ViolationType::SuspiciousGazePattern => (
                GAZE_CONFIDENCE,
                json!({
                    "consecutiveFrames": run,
                    "gazePatternScore": signal.gaze_pattern_score,
                }),
            ),
            _ => (FACE_ABSENT_CONFIDENCE, json!({ "consecutiveFrames": run })),
        };

        Violation::new(
            violation_type,
            self.settings.severities.get(violation_type),
            confidence,
            frame_number,
            timestamp,
            details,
        )
    }

    fn object_violation(
        &self,
        signal: &Signal,
        frame_number: u64,
        timestamp: DateTime<Utc>,
    ) -> Option<Violation> {
        let matches: Vec<&DetectedObject> = signal
            .detected_objects
            .iter()
            .filter(|object| {
                object.confidence >= self.settings.min_object_confidence
                    && self.settings.is_prohibited(&object.label)
            })
            .collect();

        let confidence = matches
            .iter()
            .map(|object| object.confidence)
            .reduce(f64::max)?;

        Some(Violation::new(
            ViolationType::ObjectDetected,
            self.settings.severities.get(ViolationType::ObjectDetected),
            confidence,
            frame_number,
            timestamp,
            json!({ "objects": matches }),
        ))
    }

    fn identity_violation(
        &self,
        signal: &Signal,
        frame_number: u64,
        timestamp: DateTime<Utc>,
    ) -> Option<Violation> {
        if !self.has_reference || !signal.present {
            return None;
        }

        let similarity = signal.identity_match_score;
        if similarity >= self.settings.face_similarity_threshold {
            return None;
        }

        Some(Violation::new(
            ViolationType::IdentityMismatch,
            self.settings.severities.get(ViolationType::IdentityMismatch),
            1.0 - similarity,
            frame_number,
            timestamp,
            json!({ "similarityScore": similarity }),
        ))
    }
}
