//! TOML plan format: parsing, validation, and conversion into the core
//! [`Plan`] model.
//!
//! A plan file has a `[plan]` header, `[[tasks]]` entries keyed by
//! `number`, and `[[waves]]` entries listing task numbers. Optional
//! `[quality_control]` and `[rollback]` sections configure the review
//! loop for this plan.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use maestro_core::config::{QualityControlConfig, RollbackConfig};
use maestro_core::error::OrchestratorError;
use maestro_core::model::{Criterion, Plan, Task, TaskStatus, Wave};
use maestro_core::plan::validate_plan;

/// Errors that can occur during plan parsing and validation.
#[derive(Debug, Error)]
pub enum PlanParseError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("duplicate task number: {0:?}")]
    DuplicateTaskNumber(String),

    #[error("invalid status {value:?} on task {task:?} (expected pending, completed, or failed)")]
    InvalidStatus { task: String, value: String },

    #[error(transparent)]
    Structure(#[from] OrchestratorError),
}

/// Top-level structure of a plan TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanToml {
    pub plan: PlanMeta,
    #[serde(default)]
    pub tasks: Vec<TaskToml>,
    #[serde(default)]
    pub waves: Vec<WaveToml>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_control: Option<QualityControlConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackConfig>,
}

/// Plan-level metadata in `[plan]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanMeta {
    /// Human-readable plan name.
    pub name: String,
    /// Default agent for tasks that don't specify one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
}

/// A single `[[tasks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskToml {
    /// Unique task number within the plan (referenced by waves and
    /// `depends_on`).
    pub number: String,
    pub name: String,
    /// Multi-line description handed to the agent.
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub packages: Vec<String>,
    #[serde(default)]
    pub criteria: Vec<CriterionToml>,
    /// Execution status, written back by the updater after a run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CriterionToml {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<String>,
}

/// A single `[[waves]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaveToml {
    pub name: String,
    pub tasks: Vec<String>,
    /// 0 means "all tasks in the wave at once".
    #[serde(default)]
    pub max_concurrency: usize,
}

/// Parse and validate a plan TOML string, returning the core plan.
///
/// `path` becomes the plan's `file_path` and every task's `source_file`.
pub fn parse_plan_toml(content: &str, path: &Path) -> Result<Plan, PlanParseError> {
    let parsed: PlanToml = toml::from_str(content)?;
    to_plan(parsed, path)
}

/// Convert the on-disk representation to the core model and validate it.
fn to_plan(parsed: PlanToml, path: &Path) -> Result<Plan, PlanParseError> {
    let mut plan = Plan {
        default_agent: parsed.plan.default_agent,
        file_path: Some(path.to_path_buf()),
        quality_control: parsed.quality_control,
        ..Default::default()
    };

    let mut seen = HashSet::new();
    for task_toml in parsed.tasks {
        if !seen.insert(task_toml.number.clone()) {
            return Err(PlanParseError::DuplicateTaskNumber(task_toml.number));
        }

        let status = match &task_toml.status {
            None => TaskStatus::Pending,
            Some(raw) => raw.parse().map_err(|_| PlanParseError::InvalidStatus {
                task: task_toml.number.clone(),
                value: raw.clone(),
            })?,
        };

        let mut task = Task::new(task_toml.number, task_toml.name, task_toml.prompt);
        task.agent = task_toml.agent;
        task.depends_on = task_toml.depends_on;
        task.files = task_toml.files;
        task.packages = task_toml.packages;
        task.criteria = task_toml
            .criteria
            .into_iter()
            .map(|c| Criterion {
                description: c.description,
                verification_command: c.verify,
            })
            .collect();
        task.status = status;
        task.completed_at = task_toml.completed_at;
        task.source_file = Some(path.to_path_buf());

        plan.tasks.insert(task.number.clone(), task);
    }

    plan.waves = parsed
        .waves
        .into_iter()
        .map(|w| Wave {
            name: w.name,
            task_numbers: w.tasks,
            max_concurrency: w.max_concurrency,
        })
        .collect();

    // Tasks not named in any wave get a trailing single-task wave each,
    // in task-number order, so every task is schedulable.
    let in_waves: HashSet<&String> = plan.waves.iter().flat_map(|w| &w.task_numbers).collect();
    let mut unscheduled: Vec<String> = plan
        .tasks
        .keys()
        .filter(|n| !in_waves.contains(n))
        .cloned()
        .collect();
    // Numeric order where the numbers parse ("2" before "10"); plans with
    // non-numeric identifiers fall back to lexicographic order.
    unscheduled.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    });
    for number in unscheduled {
        plan.waves.push(Wave {
            name: format!("wave-{number}"),
            task_numbers: vec![number],
            max_concurrency: 0,
        });
    }

    validate_plan(&plan)?;
    Ok(plan)
}

/// The rollback section, read separately because it configures the
/// executor rather than the plan model.
pub fn parse_rollback_config(content: &str) -> Result<Option<RollbackConfig>, PlanParseError> {
    let parsed: PlanToml = toml::from_str(content)?;
    Ok(parsed.rollback)
}
