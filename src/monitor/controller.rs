use anyhow::{bail, Context, Result};
use log::info;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::SessionStore;
use crate::registry::SessionRegistry;

use super::loop_worker::{monitor_loop, MonitorConfig, MonitorReport};
use super::source::SignalSource;

/// Runs at most one monitor loop for one session.
#[derive(Default)]
pub struct MonitorController {
    handle: Option<JoinHandle<MonitorReport>>,
    cancel_token: Option<CancellationToken>,
    drain_tx: Option<watch::Sender<bool>>,
}

impl MonitorController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_monitoring<S, Src>(
        &mut self,
        registry: SessionRegistry<S>,
        session_id: String,
        source: Src,
        config: MonitorConfig,
    ) -> Result<()>
    where
        S: SessionStore,
        Src: SignalSource,
    {
        if self.handle.is_some() {
            bail!("monitoring already active");
        }

        info!(
            "Starting monitor for session {} every {}ms",
            session_id,
            config.cadence.as_millis()
        );

        let cancel_token = CancellationToken::new();
        // false = normal operation, true = finish the current frame then exit
        let (drain_tx, drain_rx) = watch::channel(false);

        let handle = tokio::spawn(monitor_loop(
            registry,
            session_id,
            source,
            config,
            cancel_token.clone(),
            drain_rx,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.drain_tx = Some(drain_tx);
        Ok(())
    }

    /// Let the loop finish the frame in flight, then stop before the next tick.
    pub fn drain_monitoring(&mut self) {
        if let Some(tx) = &self.drain_tx {
            let _ = tx.send(true);
            info!("Drain signal sent to monitor loop");
        }
    }

    pub async fn stop_monitoring(&mut self) -> Result<Option<MonitorReport>> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.wait().await
    }

    /// Join the loop without cancelling it.
    pub async fn wait(&mut self) -> Result<Option<MonitorReport>> {
        self.drain_tx = None;
        self.cancel_token = None;
        match self.handle.take() {
            Some(handle) => handle
                .await
                .context("monitor loop task failed to join")
                .map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{SessionStatus, Signal};
    use crate::monitor::{ScriptedSource, StopReason};
    use crate::settings::Settings;

    fn fast() -> MonitorConfig {
        MonitorConfig::default().with_cadence(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_replays_until_stream_ends() {
        let registry = SessionRegistry::new(MemoryStore::new());
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        let mut signals = vec![Signal::absent(); 30];
        let mut malformed = Signal::attentive();
        malformed.identity_match_score = 2.0;
        signals.push(malformed);
        signals.push(Signal::attentive());

        let mut monitor = MonitorController::new();
        monitor
            .start_monitoring(registry.clone(), id.clone(), ScriptedSource::new(signals), fast())
            .unwrap();
        assert!(monitor
            .start_monitoring(
                registry.clone(),
                id.clone(),
                ScriptedSource::default(),
                fast()
            )
            .is_err());

        let report = monitor.wait().await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::StreamEnded);
        assert_eq!(report.frames_sent, 31);
        assert_eq!(report.frames_rejected, 1);
        assert!(!report.terminated);

        let status = registry.get_status(&id).await.unwrap();
        assert_eq!(status.total_frames, 31);
        assert_eq!(status.last_frame_number, 32);
        assert_eq!(status.violation_count, 1);
    }

    #[tokio::test]
    async fn test_stops_when_session_terminates() {
        let registry = SessionRegistry::new(MemoryStore::new());
        let mut settings = Settings::default();
        settings.enabled.object_detected = true;
        settings.auto_terminate = true;
        settings.auto_terminate_threshold = 2;
        let id = registry
            .create_session("task", "student", settings, None)
            .await
            .unwrap();

        let phone = Signal::attentive().with_object("Cell Phone", 0.95);
        let source = ScriptedSource::new(vec![phone; 10]);

        let mut monitor = MonitorController::new();
        monitor
            .start_monitoring(registry.clone(), id.clone(), source, fast())
            .unwrap();
        let report = monitor.wait().await.unwrap().unwrap();

        assert!(report.terminated);
        assert_eq!(report.stop_reason, StopReason::Terminated);
        assert_eq!(report.frames_sent, 2);
        assert_eq!(
            registry.get_status(&id).await.unwrap().status,
            SessionStatus::Terminated
        );
    }

    #[tokio::test]
    async fn test_stop_cancels_a_slow_source() {
        let registry = SessionRegistry::new(MemoryStore::new());
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();

        let source = ScriptedSource::new(vec![Signal::attentive(); 1000])
            .with_delay(Duration::from_millis(50));
        let config = fast().with_source_timeout(Duration::from_millis(10));

        let mut monitor = MonitorController::new();
        monitor
            .start_monitoring(registry.clone(), id.clone(), source, config)
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let report = monitor.stop_monitoring().await.unwrap().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.frames_sent, 0);
        assert!(report.source_timeouts >= 1);
        assert!(monitor.stop_monitoring().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stops_when_session_ended_elsewhere() {
        let registry = SessionRegistry::new(MemoryStore::new());
        let id = registry
            .create_session("task", "student", Settings::default(), None)
            .await
            .unwrap();
        registry.end_session(&id).await.unwrap();

        let mut monitor = MonitorController::new();
        monitor
            .start_monitoring(
                registry.clone(),
                id,
                ScriptedSource::new(vec![Signal::attentive()]),
                fast(),
            )
            .unwrap();
        let report = monitor.wait().await.unwrap().unwrap();
        assert_eq!(report.stop_reason, StopReason::SessionClosed);
        assert_eq!(report.frames_sent, 0);
    }
}
