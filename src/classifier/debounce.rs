use serde::{Deserialize, Serialize};

/// Edge-triggered run counter for one smoothed category.
///
/// Fires once when a run of anomalous frames reaches the threshold and stays
/// quiet for the rest of that run. Only a clean frame rearms it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebounceTracker {
    consecutive: u32,
    in_violation: bool,
}

impl DebounceTracker {
    /// Feed one frame. Returns the run length when this frame is the one that
    /// crosses `threshold`.
    pub fn observe(&mut self, anomalous: bool, threshold: u32) -> Option<u32> {
        if !anomalous {
            self.reset();
            return None;
        }

        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= threshold && !self.in_violation {
            self.in_violation = true;
            Some(self.consecutive)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
        self.in_violation = false;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn in_violation(&self) -> bool {
        self.in_violation
    }
}
