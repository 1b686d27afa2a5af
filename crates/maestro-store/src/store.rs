//! SQLite-backed [`LearningStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use maestro_core::store::{FailureAnalysis, LearningStore, TaskExecution};

use crate::models::ExecutionRow;
use crate::patterns;

/// The stock learning store: one SQLite database per developer machine.
#[derive(Debug, Clone)]
pub struct SqliteLearningStore {
    pool: SqlitePool,
}

impl SqliteLearningStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Pick a replacement agent for a struggling task: the most recent
    /// agent that succeeded on another task in the same plan and has not
    /// been tried on this one yet.
    async fn suggest_agent(
        &self,
        plan_file: &str,
        task_number: &str,
        tried_agents: &[String],
    ) -> Result<Option<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT agent FROM task_executions \
             WHERE plan_file = ? AND task_number <> ? AND success = 1 \
             ORDER BY id DESC",
        )
        .bind(plan_file)
        .bind(task_number)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to look up successful agents for {plan_file}"))?;

        Ok(rows
            .into_iter()
            .map(|(agent,)| agent)
            .find(|agent| !tried_agents.contains(agent)))
    }
}

#[async_trait]
impl LearningStore for SqliteLearningStore {
    async fn record_execution(&self, record: &TaskExecution) -> Result<()> {
        let recorded_at = record.recorded_at.unwrap_or_else(Utc::now);

        sqlx::query(
            "INSERT INTO task_executions \
             (plan_file, run_number, task_number, task_name, agent, prompt, \
              success, output, error_message, duration_secs, qc_verdict, recorded_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.plan_file)
        .bind(record.run_number as i64)
        .bind(&record.task_number)
        .bind(&record.task_name)
        .bind(&record.agent)
        .bind(&record.prompt)
        .bind(record.success)
        .bind(&record.output)
        .bind(&record.error_message)
        .bind(record.duration_secs)
        .bind(&record.qc_verdict)
        .bind(recorded_at)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "failed to record execution for task {} run {}",
                record.task_number, record.run_number
            )
        })?;

        Ok(())
    }

    async fn execution_history(
        &self,
        plan_file: &str,
        task_number: &str,
    ) -> Result<Vec<TaskExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(
            "SELECT * FROM task_executions \
             WHERE plan_file = ? AND task_number = ? \
             ORDER BY id DESC",
        )
        .bind(plan_file)
        .bind(task_number)
        .fetch_all(&self.pool)
        .await
        .with_context(|| {
            format!("failed to load execution history for task {task_number} in {plan_file}")
        })?;

        Ok(rows.into_iter().map(TaskExecution::from).collect())
    }

    async fn run_count(&self, plan_file: &str) -> Result<u32> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(run_number), 0) FROM task_executions WHERE plan_file = ?",
        )
        .bind(plan_file)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to count runs for {plan_file}"))?;

        Ok(row.0.max(0) as u32)
    }

    async fn analyze_failures(
        &self,
        plan_file: &str,
        task_number: &str,
        min_attempts: u32,
    ) -> Result<FailureAnalysis> {
        let history = self.execution_history(plan_file, task_number).await?;

        let total_attempts = history.len() as u32;
        let failures: Vec<&TaskExecution> = history.iter().filter(|r| !r.success).collect();
        let failed_attempts = failures.len() as u32;

        // Distinct agents, most recent first (history is newest-first).
        let mut tried_agents: Vec<String> = Vec::new();
        for record in &history {
            if !tried_agents.contains(&record.agent) {
                tried_agents.push(record.agent.clone());
            }
        }

        let failure_texts = failures.iter().map(|r| {
            r.error_message
                .as_deref()
                .unwrap_or(r.output.as_str())
        });
        let common_patterns = patterns::common_patterns(failure_texts);

        // A swap is worth trying once enough attempts exist and the most
        // recent ones all failed with the same agent.
        let recent_all_failed = history
            .first()
            .map(|latest| !latest.success)
            .unwrap_or(false);
        let should_try_different_agent =
            total_attempts >= min_attempts && recent_all_failed && failed_attempts * 2 >= total_attempts;

        let suggested_agent = if should_try_different_agent {
            self.suggest_agent(plan_file, task_number, &tried_agents)
                .await?
        } else {
            None
        };

        Ok(FailureAnalysis {
            total_attempts,
            failed_attempts,
            tried_agents,
            common_patterns,
            should_try_different_agent,
            suggested_agent,
        })
    }
}
