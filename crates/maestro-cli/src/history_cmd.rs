//! `maestro history` and `maestro analyze`: read APIs over the learning
//! store.

use anyhow::Result;

use maestro_core::store::LearningStore;
use maestro_store::{SqliteLearningStore, pool};

use crate::config::MaestroConfig;

async fn open_store(config: &MaestroConfig) -> Result<SqliteLearningStore> {
    let store_pool = pool::create_pool(&config.store_path).await?;
    pool::run_migrations(&store_pool, pool::default_migrations_path()).await?;
    Ok(SqliteLearningStore::new(store_pool))
}

/// Print the execution history for a task, newest first.
pub async fn history(config: MaestroConfig, plan_file: String, task_number: String) -> Result<()> {
    let store = open_store(&config).await?;
    let records = store.execution_history(&plan_file, &task_number).await?;

    if records.is_empty() {
        println!("no executions recorded for task {task_number} in {plan_file}");
        return Ok(());
    }

    for record in records {
        let outcome = if record.success { "ok" } else { "failed" };
        let verdict = record.qc_verdict.as_deref().unwrap_or("-");
        let when = record
            .recorded_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_owned());
        println!(
            "run {:>3}  {when}  {outcome:>6}  {verdict:>6}  {}  {:.1}s",
            record.run_number, record.agent, record.duration_secs
        );
        if let Some(error) = &record.error_message {
            println!("         error: {error}");
        }
    }
    Ok(())
}

/// Print the failure analysis for a task.
pub async fn analyze(
    config: MaestroConfig,
    plan_file: String,
    task_number: String,
    min_attempts: u32,
) -> Result<()> {
    let store = open_store(&config).await?;
    let analysis = store
        .analyze_failures(&plan_file, &task_number, min_attempts)
        .await?;

    println!(
        "task {task_number}: {} attempt(s), {} failed",
        analysis.total_attempts, analysis.failed_attempts
    );
    if !analysis.tried_agents.is_empty() {
        println!("tried agents: {}", analysis.tried_agents.join(", "));
    }
    if !analysis.common_patterns.is_empty() {
        println!("failure patterns: {}", analysis.common_patterns.join(", "));
    }
    println!(
        "recommendation: {}",
        if analysis.should_try_different_agent {
            "try a different agent"
        } else {
            "keep the current agent"
        }
    );
    Ok(())
}
