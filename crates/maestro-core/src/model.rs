//! Shared execution models: plans, tasks, waves, verdicts, and results.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Plan-level status of a task, as persisted in plan files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = TaskStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(TaskStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`TaskStatus`] string.
#[derive(Debug, Clone)]
pub struct TaskStatusParseError(pub String);

impl fmt::Display for TaskStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid task status: {:?}", self.0)
    }
}

impl std::error::Error for TaskStatusParseError {}

// ---------------------------------------------------------------------------

/// Outcome of one executed task, as judged by quality control.
///
/// `Green` and `Yellow` count as completed; `Red` and `Failed` count as
/// failed. `Failed` marks tasks that never produced reviewable output
/// (invocation error, gate block, cancellation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Green,
    Yellow,
    Red,
    Failed,
}

impl Verdict {
    /// Ordering used for worst-case aggregation: GREEN < YELLOW < RED.
    /// `Failed` ranks above RED so an invocation error is never masked
    /// by a friendlier reviewer.
    pub fn severity(self) -> u8 {
        match self {
            Self::Green => 0,
            Self::Yellow => 1,
            Self::Red => 2,
            Self::Failed => 3,
        }
    }

    /// Return the worse of two verdicts.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() { other } else { self }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for Verdict {
    type Err = VerdictParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GREEN" => Ok(Self::Green),
            "YELLOW" => Ok(Self::Yellow),
            "RED" => Ok(Self::Red),
            "FAILED" => Ok(Self::Failed),
            other => Err(VerdictParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Verdict`] string.
#[derive(Debug, Clone)]
pub struct VerdictParseError(pub String);

impl fmt::Display for VerdictParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid verdict: {:?}", self.0)
    }
}

impl std::error::Error for VerdictParseError {}

// ---------------------------------------------------------------------------
// Plan model
// ---------------------------------------------------------------------------

/// One acceptance criterion with an optional shell command that verifies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_command: Option<String>,
}

/// A unit of work executed by a single agent invocation.
///
/// `number` is the stable identifier within a merged plan and is immutable
/// once admitted. `agent` is the only field mutated during execution (by
/// the pre-wave guard swap and the retry swap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub number: String,
    pub name: String,
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
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Wall time of the last execution, populated after the task has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_duration: Option<Duration>,
    /// Human time estimate injected by the estimation hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_estimate_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_source: Option<String>,
}

impl Task {
    /// Minimal task with everything else defaulted.
    pub fn new(number: impl Into<String>, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            name: name.into(),
            prompt: prompt.into(),
            agent: None,
            depends_on: Vec::new(),
            files: Vec::new(),
            packages: Vec::new(),
            criteria: Vec::new(),
            status: TaskStatus::Pending,
            completed_at: None,
            source_file: None,
            metadata: HashMap::new(),
            execution_duration: None,
            human_estimate_secs: None,
            estimate_source: None,
        }
    }

    /// Whether a prior run already finished this task successfully.
    pub fn is_already_completed(&self) -> bool {
        self.status == TaskStatus::Completed || self.completed_at.is_some()
    }
}

/// An ordered group of tasks eligible to run with bounded parallelism.
///
/// `max_concurrency` of 0 (or anything larger than the wave) means "all
/// tasks in the wave at once".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub name: String,
    pub task_numbers: Vec<String>,
    #[serde(default)]
    pub max_concurrency: usize,
}

/// A named group of tasks sharing one worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeGroup {
    pub group_id: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

/// A fully-loaded plan: the task table, the wave sequence, and the
/// plan-level configuration inherited by tasks that do not override it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    /// Task table keyed by task number.
    pub tasks: std::collections::BTreeMap<String, Task>,
    pub waves: Vec<Wave>,
    #[serde(default)]
    pub worktree_groups: Vec<WorktreeGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,
    /// Task number to owning plan fragment, rebuilt by the merger.
    #[serde(default)]
    pub file_to_task: HashMap<String, PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_control: Option<crate::config::QualityControlConfig>,
}

impl Plan {
    pub fn task(&self, number: &str) -> Option<&Task> {
        self.tasks.get(number)
    }

    /// Basename of the plan file (without extension), used in branch names.
    pub fn basename(&self) -> String {
        self.file_path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "plan".to_owned())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One attempt within a task's retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub agent: String,
    pub verdict: Verdict,
    pub qc_feedback: String,
}

/// The outcome of executing (or skipping) a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_number: String,
    pub task_name: String,
    pub status: Verdict,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration: Duration,
    pub retry_count: u32,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_feedback: Option<String>,
}

impl TaskResult {
    /// GREEN or YELLOW, with no invocation error.
    pub fn is_completed(&self) -> bool {
        self.error.is_none() && matches!(self.status, Verdict::Green | Verdict::Yellow)
    }

    /// RED, FAILED, or any invocation error.
    pub fn is_failed(&self) -> bool {
        self.error.is_some() || matches!(self.status, Verdict::Red | Verdict::Failed)
    }

    /// Synthetic result for a task skipped because a prior run completed it.
    pub fn skipped(task: &Task) -> Self {
        Self {
            task_number: task.number.clone(),
            task_name: task.name.clone(),
            status: Verdict::Green,
            output: "Skipped".to_owned(),
            error: None,
            duration: Duration::ZERO,
            retry_count: 0,
            history: Vec::new(),
            review_feedback: None,
        }
    }

    /// Synthetic FAILED result carrying an error message.
    pub fn failed(task: &Task, error: impl Into<String>) -> Self {
        Self {
            task_number: task.number.clone(),
            task_name: task.name.clone(),
            status: Verdict::Failed,
            output: String::new(),
            error: Some(error.into()),
            duration: Duration::ZERO,
            retry_count: 0,
            history: Vec::new(),
            review_feedback: None,
        }
    }
}

/// Aggregate outcome of one orchestrator invocation.
///
/// `completed + failed <= total_tasks`; tasks that never ran contribute
/// to neither count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub duration: Duration,
    pub failed_tasks: Vec<String>,
    pub session_id: String,
    pub task_results: Vec<TaskResult>,
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

/// A (branch, commit) snapshot captured before a task attempt.
///
/// Created at most once per attempt that opts into rollback, destroyed by
/// an explicit delete; restoration uses `commit_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointInfo {
    pub branch_name: String,
    pub commit_hash: String,
    pub created_at: DateTime<Utc>,
}
