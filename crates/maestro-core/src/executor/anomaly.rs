//! Consecutive-failure anomaly detection, local to a single wave.

use crate::model::TaskResult;

/// Counts consecutive failures within one wave and reports when the
/// configured threshold is crossed. Anomalies are informational; they
/// never block execution.
#[derive(Debug)]
pub struct AnomalyMonitor {
    threshold: u32,
    consecutive: u32,
}

impl AnomalyMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
        }
    }

    /// Feed one result. Returns the streak length each time the count is
    /// at or past the threshold.
    pub fn observe(&mut self, result: &TaskResult) -> Option<u32> {
        if result.is_failed() {
            self.consecutive += 1;
            if self.threshold > 0 && self.consecutive >= self.threshold {
                return Some(self.consecutive);
            }
        } else {
            self.consecutive = 0;
        }
        None
    }
}
