//! Offline replay of a recorded signal stream through a full registry.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::db::{Database, MemoryStore, SessionStore};
use crate::metrics::MetricsSnapshot;
use crate::models::SessionSummary;
use crate::monitor::{MonitorConfig, MonitorController, MonitorReport, ScriptedSource};
use crate::registry::SessionRegistry;
use crate::settings::{Settings, SettingsStore};

pub const USAGE: &str = "usage: proctor-replay <signals.jsonl> [settings.json]";

const REPLAY_TASK_ID: &str = "replay";
const REPLAY_STUDENT_ID: &str = "replay";

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub signals_path: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub task_id: String,
    pub student_id: String,
    pub config: MonitorConfig,
}

impl ReplayOptions {
    pub fn new(signals_path: PathBuf) -> Self {
        Self {
            signals_path,
            settings_path: None,
            db_path: None,
            task_id: REPLAY_TASK_ID.to_string(),
            student_id: REPLAY_STUDENT_ID.to_string(),
            config: MonitorConfig::default(),
        }
    }

    /// Positional arguments plus `PROCTOR_DB` and `PROCTOR_CADENCE_MS`.
    pub fn from_args(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let signals_path = args.next().ok_or_else(|| anyhow!(USAGE))?;
        let settings_path = args.next();
        if args.next().is_some() {
            bail!(USAGE);
        }

        let mut options = Self::new(PathBuf::from(signals_path));
        options.settings_path = settings_path.map(PathBuf::from);
        options.db_path = std::env::var_os("PROCTOR_DB").map(PathBuf::from);
        options.config = MonitorConfig::from_env();
        Ok(options)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutput {
    pub session_id: String,
    pub report: MonitorReport,
    pub summary: SessionSummary,
    pub metrics: MetricsSnapshot,
}

pub async fn replay(options: ReplayOptions) -> Result<ReplayOutput> {
    let settings = match &options.settings_path {
        Some(path) => SettingsStore::new(path.clone())?.settings_for(&options.task_id),
        None => Settings::default(),
    };

    let text = std::fs::read_to_string(&options.signals_path).with_context(|| {
        format!("failed to read signals from {}", options.signals_path.display())
    })?;
    let source = ScriptedSource::from_jsonl(&text)?;

    match &options.db_path {
        Some(db_path) => {
            let registry = SessionRegistry::new(Database::new(db_path.clone())?);
            let recovered = registry.recover_interrupted().await?;
            if !recovered.is_empty() {
                warn!(
                    "Marked {} sessions left active by an earlier run as interrupted",
                    recovered.len()
                );
            }
            replay_with(registry, &options, settings, source).await
        }
        None => replay_with(SessionRegistry::new(MemoryStore::new()), &options, settings, source).await,
    }
}

async fn replay_with<S: SessionStore>(
    registry: SessionRegistry<S>,
    options: &ReplayOptions,
    settings: Settings,
    source: ScriptedSource,
) -> Result<ReplayOutput> {
    let session_id = registry
        .create_session(&options.task_id, &options.student_id, settings, None)
        .await?;
    info!(
        "Replaying {} signals into session {}",
        source.remaining(),
        session_id
    );

    let mut monitor = MonitorController::new();
    monitor.start_monitoring(registry.clone(), session_id.clone(), source, options.config)?;
    let report = monitor
        .wait()
        .await?
        .ok_or_else(|| anyhow!("monitor produced no report"))?;

    let summary = match registry.get_summary(&session_id).await? {
        Some(summary) => summary,
        None => registry.end_session(&session_id).await?,
    };

    Ok(ReplayOutput {
        session_id,
        report,
        summary,
        metrics: registry.metrics(),
    })
}
