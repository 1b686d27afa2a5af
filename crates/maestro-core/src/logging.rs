//! The `ExecutionLogger` port -- high-level run reporting.
//!
//! Distinct from `tracing` (which the core uses for diagnostics): this is
//! the channel an outer layer uses to render wave/task progress to a
//! human. Every consumer holds an `Option<Arc<dyn ExecutionLogger>>` and
//! skips the call when absent; the hook-specific channels default to
//! no-ops so implementations opt in per channel.

use std::time::Duration;

use anyhow::Result;

use crate::model::{ExecutionResult, TaskResult, Wave};

/// Run-progress reporting consumed by the executors.
pub trait ExecutionLogger: Send + Sync {
    fn wave_start(&self, wave: &Wave, task_count: usize);

    fn wave_complete(&self, wave: &Wave, duration: Duration, results: &[TaskResult]);

    /// May fail (e.g. a broken pipe); callers treat failures as best-effort.
    fn task_result(&self, result: &TaskResult) -> Result<()>;

    /// Cumulative ordered results for the current wave.
    fn progress(&self, results: &[TaskResult]);

    fn summary(&self, result: &ExecutionResult);

    fn guard_prediction(&self, task_number: &str, reason: &str, risk_factors: &[String]) {
        let _ = (task_number, reason, risk_factors);
    }

    fn agent_swap(&self, task_number: &str, from: &str, to: &str, origin: &str) {
        let _ = (task_number, from, to, origin);
    }

    fn anomaly(&self, wave_name: &str, consecutive_failures: u32) {
        let _ = (wave_name, consecutive_failures);
    }

    fn budget_status(&self, spent: f64, limit: f64) {
        let _ = (spent, limit);
    }

    fn budget_warning(&self, spent: f64, limit: f64) {
        let _ = (spent, limit);
    }
}

/// Logger that forwards everything to `tracing` at info/warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ExecutionLogger for TracingLogger {
    fn wave_start(&self, wave: &Wave, task_count: usize) {
        tracing::info!(wave = %wave.name, tasks = task_count, "wave started");
    }

    fn wave_complete(&self, wave: &Wave, duration: Duration, results: &[TaskResult]) {
        let completed = results.iter().filter(|r| r.is_completed()).count();
        tracing::info!(
            wave = %wave.name,
            duration_secs = duration.as_secs_f64(),
            completed,
            total = results.len(),
            "wave complete"
        );
    }

    fn task_result(&self, result: &TaskResult) -> Result<()> {
        tracing::info!(
            task = %result.task_number,
            name = %result.task_name,
            status = %result.status,
            retries = result.retry_count,
            "task finished"
        );
        Ok(())
    }

    fn progress(&self, results: &[TaskResult]) {
        let completed = results.iter().filter(|r| r.is_completed()).count();
        tracing::info!(completed, finished = results.len(), "wave progress");
    }

    fn summary(&self, result: &ExecutionResult) {
        tracing::info!(
            session = %result.session_id,
            total = result.total_tasks,
            completed = result.completed,
            failed = result.failed,
            duration_secs = result.duration.as_secs_f64(),
            "execution summary"
        );
    }

    fn guard_prediction(&self, task_number: &str, reason: &str, risk_factors: &[String]) {
        tracing::warn!(task = task_number, reason, ?risk_factors, "guard blocked task");
    }

    fn agent_swap(&self, task_number: &str, from: &str, to: &str, origin: &str) {
        tracing::info!(task = task_number, from, to, origin, "agent swapped");
    }

    fn anomaly(&self, wave_name: &str, consecutive_failures: u32) {
        tracing::warn!(wave = wave_name, consecutive_failures, "failure anomaly detected");
    }

    fn budget_status(&self, spent: f64, limit: f64) {
        tracing::info!(spent, limit, "budget status");
    }

    fn budget_warning(&self, spent: f64, limit: f64) {
        tracing::warn!(spent, limit, "budget nearing limit");
    }
}
