use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::SessionStore;
use crate::error::ProctorError;
use crate::models::Signal;
use crate::registry::SessionRegistry;

use super::source::SignalSource;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const DEFAULT_CADENCE_MS: u64 = 1000;
const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub cadence: Duration,
    pub source_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_millis(DEFAULT_CADENCE_MS),
            source_timeout: Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
        }
    }
}

impl MonitorConfig {
    /// Cadence from `PROCTOR_CADENCE_MS`; unset or unparsable falls back to 1s.
    pub fn from_env() -> Self {
        let cadence_ms = std::env::var("PROCTOR_CADENCE_MS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(DEFAULT_CADENCE_MS);

        Self {
            cadence: Duration::from_millis(cadence_ms),
            ..Self::default()
        }
    }

    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    StreamEnded,
    Terminated,
    SessionClosed,
    Cancelled,
    Drained,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorReport {
    pub session_id: String,
    pub frames_sent: u64,
    pub frames_rejected: u64,
    pub source_errors: u64,
    pub source_timeouts: u64,
    pub terminated: bool,
    pub stop_reason: StopReason,
}

enum Step {
    Continue,
    Stop(StopReason),
}

pub async fn monitor_loop<S, Src>(
    registry: SessionRegistry<S>,
    session_id: String,
    mut source: Src,
    config: MonitorConfig,
    cancel_token: CancellationToken,
    drain_rx: watch::Receiver<bool>,
) -> MonitorReport
where
    S: SessionStore,
    Src: SignalSource,
{
    let mut report = MonitorReport {
        session_id: session_id.clone(),
        frames_sent: 0,
        frames_rejected: 0,
        source_errors: 0,
        source_timeouts: 0,
        terminated: false,
        stop_reason: StopReason::Failed,
    };

    let mut next_frame = match registry.get_status(&session_id).await {
        Ok(status) => status.last_frame_number + 1,
        Err(err) => {
            log_error!("monitor cannot start for session {}: {}", session_id, err);
            return report;
        }
    };

    let mut ticker = tokio::time::interval(config.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let draining = *drain_rx.borrow();
        if draining {
            log_info!("monitor for session {} drained", session_id);
            report.stop_reason = StopReason::Drained;
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {
                let step = match tokio::time::timeout(config.source_timeout, source.next_signal()).await {
                    Ok(Ok(Some(signal))) => {
                        feed_frame(&registry, &session_id, &mut next_frame, signal, &mut report).await
                    }
                    Ok(Ok(None)) => Step::Stop(StopReason::StreamEnded),
                    Ok(Err(err)) => {
                        report.source_errors += 1;
                        log_error!("signal source failed for session {}: {err:?}", session_id);
                        Step::Continue
                    }
                    Err(_) => {
                        report.source_timeouts += 1;
                        log_warn!(
                            "signal source timeout (> {}ms) session {}",
                            config.source_timeout.as_millis(),
                            session_id
                        );
                        Step::Continue
                    }
                };

                if let Step::Stop(reason) = step {
                    report.stop_reason = reason;
                    break;
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("monitor loop for session {} shutting down", session_id);
                report.stop_reason = StopReason::Cancelled;
                break;
            }
        }
    }

    log_info!(
        "monitor for session {} stopped ({:?}): {} frames sent, {} rejected",
        session_id,
        report.stop_reason,
        report.frames_sent,
        report.frames_rejected
    );
    report
}

async fn feed_frame<S: SessionStore>(
    registry: &SessionRegistry<S>,
    session_id: &str,
    next_frame: &mut u64,
    signal: Signal,
    report: &mut MonitorReport,
) -> Step {
    let frame_number = *next_frame;
    match registry
        .process_frame(session_id, frame_number, signal, Utc::now())
        .await
    {
        Ok(result) => {
            report.frames_sent += 1;
            *next_frame += 1;
            if result.terminated {
                report.terminated = true;
                Step::Stop(StopReason::Terminated)
            } else {
                Step::Continue
            }
        }
        Err(ProctorError::StaleFrame {
            last_frame_number, ..
        }) => {
            // Someone else fed this session; continue after their frame.
            report.frames_rejected += 1;
            *next_frame = last_frame_number + 1;
            Step::Continue
        }
        Err(err @ ProctorError::Validation(_)) => {
            report.frames_rejected += 1;
            *next_frame += 1;
            log_debug!("session {} skipped malformed frame {}: {}", session_id, frame_number, err);
            Step::Continue
        }
        Err(ProctorError::SessionClosed { .. }) => Step::Stop(StopReason::SessionClosed),
        Err(err) => {
            log_error!("monitor for session {} failed at frame {}: {}", session_id, frame_number, err);
            Step::Stop(StopReason::Failed)
        }
    }
}
