//! Pattern intelligence: learned risk signals applied before a task runs.
//!
//! In block mode a risky task is refused outright; warn and suggest modes
//! inject the provider's guidance into the prompt instead.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::Task;

/// How assessments are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternMode {
    /// Refuse risky tasks.
    Block,
    /// Inject a warning into the prompt.
    #[default]
    Warn,
    /// Inject guidance into the prompt.
    Suggest,
}

/// A provider's judgement of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternAssessment {
    pub risky: bool,
    pub reason: String,
    pub guidance: Option<String>,
}

/// Supplies pattern assessments. `Ok(None)` means "no signal".
#[async_trait]
pub trait PatternProvider: Send + Sync {
    async fn assess(&self, task: &Task) -> Result<Option<PatternAssessment>>;
}

/// What the hook decided for a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternOutcome {
    /// Block mode refused the task.
    Block { reason: String },
    /// Context was appended to the prompt.
    Injected,
    /// Nothing to apply.
    Clear,
}

/// Pre-task hook wrapping a [`PatternProvider`].
pub struct PatternIntelligenceHook {
    provider: Arc<dyn PatternProvider>,
    mode: PatternMode,
}

impl PatternIntelligenceHook {
    pub fn new(provider: Arc<dyn PatternProvider>, mode: PatternMode) -> Self {
        Self { provider, mode }
    }

    /// Assess `task` and either block it or enrich its prompt.
    ///
    /// Provider errors degrade to [`PatternOutcome::Clear`].
    pub async fn check(&self, task: &mut Task) -> PatternOutcome {
        let assessment = match self.provider.assess(task).await {
            Ok(Some(assessment)) => assessment,
            Ok(None) => return PatternOutcome::Clear,
            Err(e) => {
                warn!(task = %task.number, error = %e, "pattern provider failed");
                return PatternOutcome::Clear;
            }
        };

        if !assessment.risky {
            return PatternOutcome::Clear;
        }

        match self.mode {
            PatternMode::Block => PatternOutcome::Block {
                reason: assessment.reason,
            },
            PatternMode::Warn | PatternMode::Suggest => {
                let guidance = assessment.guidance.as_deref().unwrap_or("");
                task.prompt.push_str(&format!(
                    "\n<pattern-intelligence>\n<risk>{}</risk>\n<guidance>{}</guidance>\n</pattern-intelligence>\n",
                    assessment.reason, guidance
                ));
                PatternOutcome::Injected
            }
        }
    }
}
