use crate::common::NodeState;

/// Consecutive-failure counter for the current primary.
///
/// There is no partial credit: one success wipes every earlier failure.
#[derive(Debug, Clone)]
pub struct FailureTracker {
    failures: u32,
    threshold: u32,
}

impl FailureTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count one failed probe. Returns `true` once the threshold is reached.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.failures >= self.threshold
    }

    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn state(&self) -> NodeState {
        NodeState::from_failures(self.failures, self.threshold)
    }
}
