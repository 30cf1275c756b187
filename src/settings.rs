use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{ProctorError, ProctorResult};
use crate::models::{Severity, ViolationType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CategoryToggles {
    pub face_absent: bool,
    pub multiple_faces: bool,
    pub gaze_away: bool,
    pub suspicious_gaze_pattern: bool,
    /// Off by default; object recognition is the most expensive detector upstream.
    pub object_detected: bool,
    /// Off by default; needs an enrolment frame.
    pub identity_mismatch: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            face_absent: true,
            multiple_faces: true,
            gaze_away: true,
            suspicious_gaze_pattern: true,
            object_detected: false,
            identity_mismatch: false,
        }
    }
}

impl CategoryToggles {
    pub fn all() -> Self {
        Self {
            face_absent: true,
            multiple_faces: true,
            gaze_away: true,
            suspicious_gaze_pattern: true,
            object_detected: true,
            identity_mismatch: true,
        }
    }

    pub fn is_enabled(&self, violation_type: ViolationType) -> bool {
        match violation_type {
            ViolationType::FaceAbsent => self.face_absent,
            ViolationType::MultipleFaces => self.multiple_faces,
            ViolationType::GazeAway => self.gaze_away,
            ViolationType::SuspiciousGazePattern => self.suspicious_gaze_pattern,
            ViolationType::ObjectDetected => self.object_detected,
            ViolationType::IdentityMismatch => self.identity_mismatch,
        }
    }

    pub fn set(&mut self, violation_type: ViolationType, enabled: bool) {
        let slot = match violation_type {
            ViolationType::FaceAbsent => &mut self.face_absent,
            ViolationType::MultipleFaces => &mut self.multiple_faces,
            ViolationType::GazeAway => &mut self.gaze_away,
            ViolationType::SuspiciousGazePattern => &mut self.suspicious_gaze_pattern,
            ViolationType::ObjectDetected => &mut self.object_detected,
            ViolationType::IdentityMismatch => &mut self.identity_mismatch,
        };
        *slot = enabled;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeverityTable {
    pub face_absent: Severity,
    pub multiple_faces: Severity,
    pub gaze_away: Severity,
    pub suspicious_gaze_pattern: Severity,
    pub object_detected: Severity,
    pub identity_mismatch: Severity,
}

impl Default for SeverityTable {
    fn default() -> Self {
        Self {
            face_absent: Severity::Medium,
            multiple_faces: Severity::High,
            gaze_away: Severity::Low,
            suspicious_gaze_pattern: Severity::Medium,
            object_detected: Severity::High,
            identity_mismatch: Severity::High,
        }
    }
}

impl SeverityTable {
    pub fn get(&self, violation_type: ViolationType) -> Severity {
        match violation_type {
            ViolationType::FaceAbsent => self.face_absent,
            ViolationType::MultipleFaces => self.multiple_faces,
            ViolationType::GazeAway => self.gaze_away,
            ViolationType::SuspiciousGazePattern => self.suspicious_gaze_pattern,
            ViolationType::ObjectDetected => self.object_detected,
            ViolationType::IdentityMismatch => self.identity_mismatch,
        }
    }
}

/// Per-task proctoring configuration. Validated once when a session is
/// created and frozen into that session afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: CategoryToggles,
    pub severities: SeverityTable,

    /// Consecutive frames without a face before a violation
    pub max_absent_frames: u32,
    /// Consecutive frames with more than one face before a violation
    pub max_multiple_face_frames: u32,
    /// Consecutive frames looking off screen before a violation
    pub max_look_away_frames: u32,
    /// Consecutive frames above `gaze_pattern_threshold` before a violation
    pub max_gaze_pattern_frames: u32,
    pub gaze_pattern_threshold: f64,

    pub min_object_confidence: f64,
    /// Identity match scores below this are a mismatch.
    pub face_similarity_threshold: f64,
    /// Case-insensitive substrings matched against detector labels.
    pub prohibited_objects: Vec<String>,

    pub auto_terminate: bool,
    /// High-severity violations that end the session when `auto_terminate` is set.
    pub auto_terminate_threshold: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: CategoryToggles::default(),
            severities: SeverityTable::default(),
            max_absent_frames: 30,
            max_multiple_face_frames: 15,
            max_look_away_frames: 60,
            max_gaze_pattern_frames: 5,
            gaze_pattern_threshold: 0.5,
            min_object_confidence: 0.5,
            face_similarity_threshold: 0.6,
            prohibited_objects: ["cell phone", "mobile phone", "book", "laptop", "tablet"]
                .into_iter()
                .map(String::from)
                .collect(),
            auto_terminate: false,
            auto_terminate_threshold: 3,
        }
    }
}

impl Settings {
    /// Consecutive-frame threshold for a smoothed category.
    pub fn frame_threshold(&self, violation_type: ViolationType) -> Option<u32> {
        match violation_type {
            ViolationType::FaceAbsent => Some(self.max_absent_frames),
            ViolationType::MultipleFaces => Some(self.max_multiple_face_frames),
            ViolationType::GazeAway => Some(self.max_look_away_frames),
            ViolationType::SuspiciousGazePattern => Some(self.max_gaze_pattern_frames),
            ViolationType::ObjectDetected | ViolationType::IdentityMismatch => None,
        }
    }

    pub fn is_prohibited(&self, label: &str) -> bool {
        let label = label.to_lowercase();
        self.prohibited_objects
            .iter()
            .any(|prohibited| label.contains(&prohibited.to_lowercase()))
    }

    pub fn validate(&self) -> ProctorResult<()> {
        let frame_thresholds = [
            ("maxAbsentFrames", self.max_absent_frames),
            ("maxMultipleFaceFrames", self.max_multiple_face_frames),
            ("maxLookAwayFrames", self.max_look_away_frames),
            ("maxGazePatternFrames", self.max_gaze_pattern_frames),
            ("autoTerminateThreshold", self.auto_terminate_threshold),
        ];
        for (field, value) in frame_thresholds {
            if value == 0 {
                return Err(ProctorError::Configuration(format!(
                    "{field} must be greater than zero"
                )));
            }
        }

        let unit_values = [
            ("gazePatternThreshold", self.gaze_pattern_threshold),
            ("minObjectConfidence", self.min_object_confidence),
            ("faceSimilarityThreshold", self.face_similarity_threshold),
        ];
        for (field, value) in unit_values {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(ProctorError::Configuration(format!(
                    "{field} must be within [0, 1], got {value}"
                )));
            }
        }

        if self
            .prohibited_objects
            .iter()
            .any(|label| label.trim().is_empty())
        {
            return Err(ProctorError::Configuration(
                "prohibitedObjects contains an empty label".into(),
            ));
        }
        if self.enabled.object_detected && self.prohibited_objects.is_empty() {
            return Err(ProctorError::Configuration(
                "object detection is enabled but prohibitedObjects is empty".into(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SettingsFile {
    default: Settings,
    tasks: BTreeMap<String, Settings>,
}

impl SettingsFile {
    fn validate(&self) -> Result<()> {
        self.default
            .validate()
            .context("default settings are invalid")?;
        for (task_id, settings) in &self.tasks {
            settings
                .validate()
                .with_context(|| format!("settings for task {task_id} are invalid"))?;
        }
        Ok(())
    }
}

/// JSON-file backed settings: one default plus per-task overrides.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SettingsFile>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let data: SettingsFile = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
            data.validate()?;
            data
        } else {
            SettingsFile::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn settings_for(&self, task_id: &str) -> Settings {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .tasks
            .get(task_id)
            .cloned()
            .unwrap_or_else(|| guard.default.clone())
    }

    pub fn update_task(&self, task_id: &str, settings: Settings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.tasks.insert(task_id.to_string(), settings);
        self.persist(&guard)
    }

    pub fn update_default(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.default = settings;
        self.persist(&guard)
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)?;
        let data: SettingsFile = serde_json::from_str(&contents)?;
        data.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        *guard = data;
        Ok(())
    }

    fn persist(&self, data: &SettingsFile) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path() -> PathBuf {
        std::env::temp_dir().join(format!("proctor-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_absent_frames, 30);
        assert_eq!(settings.severities.get(ViolationType::MultipleFaces), Severity::High);
        assert!(!settings.enabled.is_enabled(ViolationType::ObjectDetected));
    }

    #[test]
    fn test_zero_threshold_is_a_configuration_error() {
        let settings = Settings {
            max_look_away_frames: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ProctorError::Configuration(_))
        ));

        let settings = Settings {
            auto_terminate_threshold: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ProctorError::Configuration(_))
        ));
    }

    #[test]
    fn test_confidence_outside_unit_interval_is_a_configuration_error() {
        for bad in [-0.01, 1.01, f64::NAN] {
            let settings = Settings {
                min_object_confidence: bad,
                ..Settings::default()
            };
            assert!(matches!(
                settings.validate(),
                Err(ProctorError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_prohibited_labels_match_case_insensitively() {
        let settings = Settings::default();
        assert!(settings.is_prohibited("Cell Phone"));
        assert!(settings.is_prohibited("notebook"));
        assert!(!settings.is_prohibited("cup"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"autoTerminate":true,"enabled":{"objectDetected":true}}"#)
                .unwrap();
        assert!(settings.auto_terminate);
        assert!(settings.enabled.object_detected);
        assert!(settings.enabled.face_absent);
        assert_eq!(settings.auto_terminate_threshold, 3);
    }

    #[test]
    fn test_store_persists_task_overrides() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();

        let custom = Settings {
            max_absent_frames: 10,
            ..Settings::default()
        };
        store.update_task("quiz-1", custom.clone()).unwrap();

        let reopened = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reopened.settings_for("quiz-1"), custom);
        assert_eq!(reopened.settings_for("quiz-2"), Settings::default());

        let _ = fs::remove_file(path);
    }

    #[test]
    fn test_store_rejects_invalid_update() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();
        let invalid = Settings {
            face_similarity_threshold: 2.0,
            ..Settings::default()
        };

        assert!(store.update_task("quiz-1", invalid).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_store_rejects_invalid_file() {
        let path = temp_settings_path();
        fs::write(&path, r#"{"default":{"maxAbsentFrames":0}}"#).unwrap();

        assert!(SettingsStore::new(path.clone()).is_err());

        let _ = fs::remove_file(path);
    }
}
