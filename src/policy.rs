use crate::risk::RiskCounters;
use crate::settings::Settings;

/// Decides when accumulated high-severity violations force a session closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationPolicy {
    auto_terminate: bool,
    threshold: u32,
}

impl TerminationPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            auto_terminate: settings.auto_terminate,
            threshold: settings.auto_terminate_threshold,
        }
    }

    pub fn evaluate(&self, counters: &RiskCounters) -> bool {
        self.auto_terminate && counters.high_count >= self.threshold
    }
}
