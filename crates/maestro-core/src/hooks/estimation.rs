//! Estimation hook: attaches a human time estimate before a task runs
//! and logs the realised speedup afterwards.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::model::Task;

/// A human time estimate for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanEstimate {
    pub seconds: u64,
    /// Where the estimate came from (plan annotation, model, heuristic).
    pub source: String,
}

/// Supplies human estimates. `Ok(None)` means "no estimate".
#[async_trait]
pub trait EstimateProvider: Send + Sync {
    async fn estimate(&self, task: &Task) -> Result<Option<HumanEstimate>>;
}

/// Pre/post-task estimation wrapper.
pub struct EstimationHook {
    provider: Arc<dyn EstimateProvider>,
}

impl EstimationHook {
    pub fn new(provider: Arc<dyn EstimateProvider>) -> Self {
        Self { provider }
    }

    /// Write the estimate onto the task. Provider errors degrade to no-op.
    pub async fn pre_task(&self, task: &mut Task) {
        match self.provider.estimate(task).await {
            Ok(Some(estimate)) => {
                task.human_estimate_secs = Some(estimate.seconds);
                task.estimate_source = Some(estimate.source);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(task = %task.number, error = %e, "estimate provider failed");
            }
        }
    }

    /// Log the speedup achieved against the human estimate.
    pub fn post_task(&self, task: &Task) {
        let (Some(estimate), Some(duration)) = (task.human_estimate_secs, task.execution_duration)
        else {
            return;
        };
        let actual = duration.as_secs_f64();
        if actual <= 0.0 {
            return;
        }
        let speedup = estimate as f64 / actual;
        info!(
            task = %task.number,
            human_estimate_secs = estimate,
            actual_secs = actual,
            speedup = format!("{speedup:.1}x"),
            source = task.estimate_source.as_deref().unwrap_or("unknown"),
            "estimation comparison"
        );
    }
}
