use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::Signal;

/// Supplies one observation per frame. `Ok(None)` ends the stream.
pub trait SignalSource: Send + 'static {
    fn next_signal(&mut self) -> impl Future<Output = Result<Option<Signal>>> + Send;
}

/// Replays a fixed list of signals, optionally pausing before each one.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    signals: VecDeque<Signal>,
    delay: Option<Duration>,
}

impl ScriptedSource {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            signals: signals.into(),
            delay: None,
        }
    }

    /// Pause before yielding each signal. Lets tests exercise slow detectors.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// One JSON signal per line; blank lines are skipped.
    pub fn from_jsonl(text: &str) -> Result<Self> {
        let signals = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<Signal>(line)
                    .with_context(|| format!("invalid signal on line {}", index + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(signals))
    }

    pub fn remaining(&self) -> usize {
        self.signals.len()
    }
}

impl SignalSource for ScriptedSource {
    async fn next_signal(&mut self) -> Result<Option<Signal>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.signals.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_jsonl_reports_bad_line() {
        let text = r#"{"present":true,"faceCount":1}

{"present":false,"faceCount":0,"gazeOffScreen":false,"gazePatternScore":0.0,"detectedObjects":[]}
not json"#;
        let err = ScriptedSource::from_jsonl(text).unwrap_err();
        assert!(err.to_string().contains("line 4"));
    }

    #[tokio::test]
    async fn test_replays_in_order_then_ends() {
        let text = r#"{"present":false,"faceCount":0,"gazeOffScreen":false,"gazePatternScore":0.0,"detectedObjects":[]}
{"present":true,"faceCount":2,"gazeOffScreen":true,"gazePatternScore":0.2,"detectedObjects":[{"label":"book","confidence":0.9}],"identityMatchScore":0.4}"#;
        let mut source = ScriptedSource::from_jsonl(text).unwrap();
        assert_eq!(source.remaining(), 2);

        let first = source.next_signal().await.unwrap().unwrap();
        assert!(!first.present);
        assert!((first.identity_match_score - 1.0).abs() < f64::EPSILON);

        let second = source.next_signal().await.unwrap().unwrap();
        assert_eq!(second.face_count, 2);
        assert_eq!(second.detected_objects[0].label, "book");

        assert!(source.next_signal().await.unwrap().is_none());
    }
}
