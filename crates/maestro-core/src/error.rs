//! Error taxonomy for the execution core.
//!
//! Validation failures are fatal and returned from the originating call.
//! Hook failures degrade to warnings unless the hook is a hard gate
//! (branch guard, pattern-intelligence block mode, budget).

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the execution core.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("at least one plan is required")]
    PlanRequired,

    #[error("merged plan contains no tasks")]
    EmptyPlan,

    #[error("duplicate task number {number:?} across merged plans")]
    DuplicateTaskNumber { number: String },

    #[error("wave {wave:?} references unknown task {task:?}")]
    UnknownWaveTask { wave: String, task: String },

    #[error("dependency cycle detected involving tasks: {0}")]
    CycleDetected(String),

    #[error("task {name:?} ({number}): {message}")]
    Task {
        number: String,
        name: String,
        message: String,
    },

    #[error("{phase} timed out after {}s", timeout.as_secs())]
    Timeout { phase: String, timeout: Duration },

    #[error("task {task:?} blocked by {gate}: {reason}")]
    GuardBlock {
        task: String,
        gate: String,
        reason: String,
    },

    #[error("working tree is dirty: commit or stash changes before running")]
    DirtyWorkingTree,

    #[error("budget exceeded: spent {spent:.2} of {limit:.2}")]
    BudgetExceeded { spent: f64, limit: f64 },

    #[error("checkpoint operation failed: {0}")]
    Checkpoint(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_context() {
        let err = OrchestratorError::UnknownWaveTask {
            wave: "wave-2".to_owned(),
            task: "9".to_owned(),
        };
        assert_eq!(err.to_string(), "wave \"wave-2\" references unknown task \"9\"");

        let err = OrchestratorError::Timeout {
            phase: "agent invocation".to_owned(),
            timeout: Duration::from_secs(300),
        };
        assert!(err.to_string().contains("300s"));
    }

    #[test]
    fn downcasts_through_anyhow() {
        let err: anyhow::Error = OrchestratorError::EmptyPlan.into();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::EmptyPlan)
        ));
    }
}
