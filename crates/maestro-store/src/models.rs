//! Row types for the learning store tables.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use maestro_core::store::TaskExecution;

/// One row of `task_executions`.
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub id: i64,
    pub plan_file: String,
    pub run_number: i64,
    pub task_number: String,
    pub task_name: String,
    pub agent: String,
    pub prompt: String,
    pub success: bool,
    pub output: String,
    pub error_message: Option<String>,
    pub duration_secs: f64,
    pub qc_verdict: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<ExecutionRow> for TaskExecution {
    fn from(row: ExecutionRow) -> Self {
        Self {
            plan_file: row.plan_file,
            run_number: row.run_number.max(0) as u32,
            task_number: row.task_number,
            task_name: row.task_name,
            agent: row.agent,
            prompt: row.prompt,
            success: row.success,
            output: row.output,
            error_message: row.error_message,
            duration_secs: row.duration_secs,
            qc_verdict: row.qc_verdict,
            recorded_at: Some(row.recorded_at),
        }
    }
}
