//! Plan feedback updater: writes execution outcomes back into the plan
//! file that owns a task, preserving the file's formatting via
//! `toml_edit`.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use toml_edit::{DocumentMut, value};

use maestro_core::model::{Task, TaskResult};
use maestro_core::plan::PlanUpdater;

/// Updates `status`, `completed_at`, and `review_feedback` on the task's
/// `[[tasks]]` entry.
pub struct TomlPlanUpdater {
    /// Fallback plan path for tasks without a `source_file`.
    default_plan: Option<PathBuf>,
}

impl TomlPlanUpdater {
    pub fn new(default_plan: Option<PathBuf>) -> Self {
        Self { default_plan }
    }

    fn apply(document: &mut DocumentMut, task: &Task, result: &TaskResult) -> Result<()> {
        let Some(tasks) = document
            .get_mut("tasks")
            .and_then(|t| t.as_array_of_tables_mut())
        else {
            bail!("plan file has no [[tasks]] entries");
        };

        let Some(entry) = tasks.iter_mut().find(|t| {
            t.get("number").and_then(|n| n.as_str()) == Some(task.number.as_str())
        }) else {
            bail!("task {} not found in plan file", task.number);
        };

        let status = if result.is_completed() { "completed" } else { "failed" };
        entry["status"] = value(status);
        if result.is_completed() {
            entry["completed_at"] = value(Utc::now().to_rfc3339());
        }
        match &result.review_feedback {
            Some(feedback) if !feedback.is_empty() => {
                entry["review_feedback"] = value(feedback.as_str());
            }
            _ => {
                entry.remove("review_feedback");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl PlanUpdater for TomlPlanUpdater {
    async fn update_task_feedback(&self, task: &Task, result: &TaskResult) -> Result<()> {
        let Some(path) = task.source_file.clone().or_else(|| self.default_plan.clone()) else {
            bail!("task {} has no owning plan file", task.number);
        };

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read plan file {}", path.display()))?;
        let mut document: DocumentMut = contents
            .parse()
            .with_context(|| format!("failed to parse plan file {}", path.display()))?;

        Self::apply(&mut document, task, result)?;

        std::fs::write(&path, document.to_string())
            .with_context(|| format!("failed to write plan file {}", path.display()))?;

        Ok(())
    }
}
