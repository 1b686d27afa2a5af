//! The `Reviewer` trait -- the interface quality control consumes.

mod agent;

pub use agent::AgentReviewer;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Task, Verdict};

/// The verdict one reviewing agent returns for one invocation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewResult {
    pub flag: Verdict,
    pub feedback: String,
    /// A different agent this reviewer believes would do better.
    pub suggested_agent: Option<String>,
    /// Whether the reviewer believes a retry is worthwhile (RED only).
    pub retry: bool,
    /// Name of the reviewing agent that produced this result.
    pub agent_name: String,
}

/// Interface for a single QC review pass.
#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Review `output` produced for `task` using the reviewing agent
    /// `agent_name`.
    async fn review(&self, task: &Task, agent_name: &str, output: &str) -> Result<ReviewResult>;
}

// Compile-time assertion: Reviewer must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Reviewer) {}
};
