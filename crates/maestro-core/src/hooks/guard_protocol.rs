//! Pre-wave risk analysis (the GUARD protocol).
//!
//! Before a wave dispatches, the protocol sees every task queued for
//! execution and may block individual tasks or substitute their agent.

use anyhow::Result;
use async_trait::async_trait;

use crate::model::Task;

/// One task's pre-wave risk decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDecision {
    pub task_number: String,
    pub should_block: bool,
    pub reason: String,
    pub risk_factors: Vec<String>,
    /// Replace the task's agent before dispatch.
    pub suggested_agent: Option<String>,
}

/// Pre-wave gate over the tasks about to execute.
#[async_trait]
pub trait GuardProtocol: Send + Sync {
    /// Assess the wave's execution queue. Tasks without a decision run
    /// unchanged.
    async fn assess_wave(&self, tasks: &[Task]) -> Result<Vec<GuardDecision>>;
}
