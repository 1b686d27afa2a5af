//! The `LearningStore` trait -- the append-only execution log the core
//! records into and reads back for failure analysis.
//!
//! The store is the only persisted state of the core; the stock SQLite
//! backend lives in the `maestro-store` crate.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskExecution {
    pub plan_file: String,
    pub run_number: u32,
    pub task_number: String,
    pub task_name: String,
    pub agent: String,
    pub prompt: String,
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc_verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Aggregated view of a task's failure history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    pub total_attempts: u32,
    pub failed_attempts: u32,
    /// Distinct agents already tried, most recent first.
    pub tried_agents: Vec<String>,
    /// Recognised failure patterns (e.g. `compilation_error`, `timeout`).
    pub common_patterns: Vec<String>,
    pub should_try_different_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_agent: Option<String>,
}

/// Append-only execution log with read APIs for learning.
///
/// Concurrent appenders are permitted; readers tolerate concurrent
/// appends.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Append one execution record. Never updates in place.
    async fn record_execution(&self, record: &TaskExecution) -> Result<()>;

    /// All records for `(plan_file, task_number)`, newest first.
    async fn execution_history(
        &self,
        plan_file: &str,
        task_number: &str,
    ) -> Result<Vec<TaskExecution>>;

    /// Highest run number recorded for `plan_file` (0 when none).
    async fn run_count(&self, plan_file: &str) -> Result<u32>;

    /// Summarise failures for `(plan_file, task_number)`. Implementations
    /// return a default analysis when fewer than `min_attempts` records
    /// exist.
    async fn analyze_failures(
        &self,
        plan_file: &str,
        task_number: &str,
        min_attempts: u32,
    ) -> Result<FailureAnalysis>;
}

// Compile-time assertion: LearningStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn LearningStore) {}
};
