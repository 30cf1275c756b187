//! Integrity engine for proctored online assessments.
//!
//! A [`SessionRegistry`] owns live sessions. Every frame's [`Signal`] runs
//! through the violation classifier, the risk counters and the termination
//! policy, and the outcome is written to a [`SessionStore`] before it becomes
//! visible in memory.

pub mod classifier;
pub mod db;
pub mod error;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod policy;
pub mod registry;
pub mod replay;
pub mod risk;
pub mod settings;
pub mod utils;

pub use db::{ActiveSessionExists, Database, MemoryStore, SessionStore};
pub use error::{ProctorError, ProctorResult};
pub use models::{
    DetectedObject, SessionStatus, SessionSummary, Severity, Signal, StatusReport, Violation,
    ViolationType,
};
pub use monitor::{MonitorConfig, MonitorController, MonitorReport, ScriptedSource, SignalSource};
pub use registry::{DashboardSnapshot, FrameResult, SessionRegistry, SessionSnapshot};
pub use risk::{RiskAssessment, RiskLevel};
pub use settings::{Settings, SettingsStore};
