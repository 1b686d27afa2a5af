//! Configuration structs injected by the outer layers.
//!
//! The core exposes no CLI surface; every knob arrives through these
//! structs. Each optional subsystem has its own section so a caller can
//! enable exactly what it wires up.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Quality control
// ---------------------------------------------------------------------------

/// How reviewing agents are chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Baseline reviewer plus language agents derived from file extensions.
    #[default]
    Auto,
    /// Exactly the configured list.
    Explicit,
    /// Auto-selection unioned with the configured additional agents.
    Mixed,
}

/// Quality-control review loop configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityControlConfig {
    pub enabled: bool,
    #[serde(default)]
    pub mode: SelectionMode,
    /// Used verbatim in `explicit` mode.
    #[serde(default)]
    pub explicit_agents: Vec<String>,
    /// Unioned with auto-selection in `mixed` mode.
    #[serde(default)]
    pub additional_agents: Vec<String>,
    /// Removed from the selection in every mode; the baseline is blockable.
    #[serde(default)]
    pub blocked_agents: Vec<String>,
    /// Number of retries after the initial attempt on a RED verdict.
    #[serde(default)]
    pub retry_on_red: u32,
    /// Allow the agent to be substituted between attempts.
    #[serde(default)]
    pub swap_during_retries: bool,
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

/// When the rollback manager restores a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMode {
    /// Never roll back automatically.
    #[default]
    Manual,
    /// Roll back on any RED verdict.
    AutoOnRed,
    /// Roll back on RED only once retries are exhausted.
    AutoOnMaxRetries,
    /// Unrecognised mode string; treated as "never".
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RollbackConfig {
    pub enabled: bool,
    #[serde(default)]
    pub mode: RollbackMode,
}

// ---------------------------------------------------------------------------
// Branch guard
// ---------------------------------------------------------------------------

/// Protected-branch discipline applied once per run, before any setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchGuardConfig {
    #[serde(default = "default_protected_branches")]
    pub protected_branches: Vec<String>,
    #[serde(default = "default_working_branch_prefix")]
    pub working_branch_prefix: String,
    #[serde(default)]
    pub require_clean_state: bool,
}

impl Default for BranchGuardConfig {
    fn default() -> Self {
        Self {
            protected_branches: default_protected_branches(),
            working_branch_prefix: default_working_branch_prefix(),
            require_clean_state: false,
        }
    }
}

fn default_protected_branches() -> Vec<String> {
    vec!["main".to_owned(), "master".to_owned()]
}

fn default_working_branch_prefix() -> String {
    "maestro-run/".to_owned()
}

// ---------------------------------------------------------------------------
// Budget
// ---------------------------------------------------------------------------

/// Where the budget gate is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetCheckInterval {
    #[default]
    PerWave,
    PerTask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_cost_per_run: f64,
    /// Ratio of the limit at which a warning is logged.
    #[serde(default = "default_warn_threshold")]
    pub warn_threshold: f64,
    #[serde(default)]
    pub check_interval: BudgetCheckInterval,
    /// Cost attributed per minute of agent wall time.
    #[serde(default = "default_cost_per_minute")]
    pub cost_per_minute: f64,
}

fn default_warn_threshold() -> f64 {
    0.8
}

fn default_cost_per_minute() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Top-level configuration for one orchestrator invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Session tag reused across persisted records. Synthesized from the
    /// wall clock when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Monotonic run counter. When absent it is derived from the learning
    /// store (`run_count + 1`), or 0 without a store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_number: Option<u32>,
    /// Re-run tasks a prior run already completed. Off by default: a
    /// successful task is never rewritten without this explicit flag.
    #[serde(default)]
    pub rerun_completed: bool,
    #[serde(default)]
    pub quality_control: QualityControlConfig,
    #[serde(default)]
    pub rollback: RollbackConfig,
    /// Consecutive failures within a wave before an anomaly is logged.
    #[serde(default = "default_anomaly_threshold")]
    pub anomaly_threshold: u32,
}

fn default_anomaly_threshold() -> u32 {
    3
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            run_number: None,
            rerun_completed: false,
            quality_control: QualityControlConfig::default(),
            rollback: RollbackConfig::default(),
            anomaly_threshold: default_anomaly_threshold(),
        }
    }
}

impl ExecutionConfig {
    /// Whether already-completed tasks should be skipped.
    pub fn skip_completed(&self) -> bool {
        !self.rerun_completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_rollback_mode_deserializes_to_unknown() {
        let mode: RollbackMode = serde_json::from_str("\"auto_on_full_moon\"").unwrap();
        assert_eq!(mode, RollbackMode::Unknown);
        let mode: RollbackMode = serde_json::from_str("\"auto_on_red\"").unwrap();
        assert_eq!(mode, RollbackMode::AutoOnRed);
    }

    #[test]
    fn skip_completed_is_the_default() {
        let config = ExecutionConfig::default();
        assert!(config.skip_completed());
    }

    #[test]
    fn branch_guard_defaults() {
        let config = BranchGuardConfig::default();
        assert_eq!(config.protected_branches, vec!["main", "master"]);
        assert_eq!(config.working_branch_prefix, "maestro-run/");
    }
}
