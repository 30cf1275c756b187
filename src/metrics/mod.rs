mod types;

pub use types::{FrameMetrics, MetricsSnapshot};

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Default)]
struct MetricsState {
    frames_processed: AtomicU64,
    frames_rejected: AtomicU64,
    violations_emitted: AtomicU64,
    sessions_created: AtomicU64,
    sessions_terminated: AtomicU64,
    total_processing_micros: AtomicU64,
    max_processing_micros: AtomicU64,
}

/// Engine-wide counters. Updated from every session task without locking.
#[derive(Default)]
pub struct MetricsCollector {
    inner: Arc<MetricsState>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self, metrics: FrameMetrics) {
        let state = &self.inner;
        state.frames_processed.fetch_add(1, Ordering::Relaxed);
        state
            .violations_emitted
            .fetch_add(u64::from(metrics.violations), Ordering::Relaxed);
        if metrics.terminated {
            state.sessions_terminated.fetch_add(1, Ordering::Relaxed);
        }
        state
            .total_processing_micros
            .fetch_add(metrics.processing_micros, Ordering::Relaxed);
        state
            .max_processing_micros
            .fetch_max(metrics.processing_micros, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.inner.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_created(&self) {
        self.inner.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let state = &self.inner;
        let frames_processed = state.frames_processed.load(Ordering::Relaxed);
        let total_processing_micros = state.total_processing_micros.load(Ordering::Relaxed);

        MetricsSnapshot {
            frames_processed,
            frames_rejected: state.frames_rejected.load(Ordering::Relaxed),
            violations_emitted: state.violations_emitted.load(Ordering::Relaxed),
            sessions_created: state.sessions_created.load(Ordering::Relaxed),
            sessions_terminated: state.sessions_terminated.load(Ordering::Relaxed),
            total_processing_micros,
            max_processing_micros: state.max_processing_micros.load(Ordering::Relaxed),
            mean_processing_micros: if frames_processed == 0 {
                0.0
            } else {
                total_processing_micros as f64 / frames_processed as f64
            },
        }
    }

    pub fn reset(&self) {
        let state = &self.inner;
        for counter in [
            &state.frames_processed,
            &state.frames_rejected,
            &state.violations_emitted,
            &state.sessions_created,
            &state.sessions_terminated,
            &state.total_processing_micros,
            &state.max_processing_micros,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Clone for MetricsCollector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}
