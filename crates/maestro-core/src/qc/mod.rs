//! Quality control: fan a task's output past the selected reviewers and
//! aggregate their verdicts.

mod selector;

pub use selector::{BASELINE_REVIEWER, select_reviewers};

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::config::QualityControlConfig;
use crate::invoke::AgentRegistry;
use crate::model::{Task, Verdict};
use crate::review::Reviewer;

/// Aggregated outcome of one QC pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QcOutcome {
    pub verdict: Verdict,
    pub feedback: String,
    /// First distinct suggestion in reviewer order.
    pub suggested_agent: Option<String>,
    /// Whether any reviewer judged a retry worthwhile.
    pub retry: bool,
}

impl QcOutcome {
    /// Outcome used when review is disabled or no reviewer is available.
    pub fn accepted() -> Self {
        Self {
            verdict: Verdict::Green,
            feedback: String::new(),
            suggested_agent: None,
            retry: false,
        }
    }
}

/// Invokes reviewers and reduces their verdicts to a single outcome.
pub struct QualityController {
    reviewer: Arc<dyn Reviewer>,
    registry: Option<Arc<dyn AgentRegistry>>,
}

impl QualityController {
    pub fn new(reviewer: Arc<dyn Reviewer>, registry: Option<Arc<dyn AgentRegistry>>) -> Self {
        Self { reviewer, registry }
    }

    /// Review `output` for `task` with every selected reviewing agent.
    ///
    /// Reviewers run in selection order and are aggregated
    /// deterministically: worst-case verdict, feedback concatenated in
    /// order, the first non-empty agent suggestion wins. A reviewer that
    /// errors is skipped with a warning; when every reviewer errors (or
    /// the selection is empty) the output is accepted as GREEN.
    pub async fn review(
        &self,
        task: &Task,
        config: &QualityControlConfig,
        output: &str,
    ) -> Result<QcOutcome> {
        let reviewers = select_reviewers(task, config, self.registry.as_deref());
        if reviewers.is_empty() {
            warn!(task = %task.number, "no reviewers selected, accepting output");
            return Ok(QcOutcome::accepted());
        }

        let mut verdict: Option<Verdict> = None;
        let mut feedback = String::new();
        let mut suggested_agent: Option<String> = None;
        let mut retry = false;

        for agent_name in &reviewers {
            let result = match self.reviewer.review(task, agent_name, output).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(task = %task.number, reviewer = %agent_name, error = %e, "reviewer failed, skipping");
                    continue;
                }
            };

            verdict = Some(match verdict {
                Some(v) => v.worst(result.flag),
                None => result.flag,
            });
            if !result.feedback.is_empty() {
                feedback.push_str(&format!("[{agent_name}] {}\n", result.feedback));
            }
            if suggested_agent.is_none() {
                suggested_agent = result.suggested_agent;
            }
            retry = retry || result.retry;
        }

        let Some(verdict) = verdict else {
            warn!(task = %task.number, "all reviewers failed, accepting output");
            return Ok(QcOutcome::accepted());
        };

        Ok(QcOutcome {
            verdict,
            feedback,
            suggested_agent,
            retry,
        })
    }
}
