//! Branch guard: keeps runs off protected branches.
//!
//! When the current branch is protected, a working branch named
//! `<prefix><plan-basename>-<timestamp>` is created and switched to
//! before any task runs. The hook wrapper tolerates being entirely
//! unconfigured.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use crate::checkpoint::Checkpointer;
use crate::config::BranchGuardConfig;
use crate::error::OrchestratorError;

/// Outcome of the branch guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardResult {
    pub original_branch: String,
    pub was_protected: bool,
    /// Empty when no working branch was needed.
    pub working_branch: String,
}

/// Protects configured branches by redirecting work to a run branch.
pub struct BranchGuard {
    checkpointer: Arc<dyn Checkpointer>,
    config: BranchGuardConfig,
    /// Basename of the plan file, used in the working branch name.
    plan_basename: String,
}

impl BranchGuard {
    pub fn new(
        checkpointer: Arc<dyn Checkpointer>,
        config: BranchGuardConfig,
        plan_basename: impl Into<String>,
    ) -> Self {
        Self {
            checkpointer,
            config,
            plan_basename: plan_basename.into(),
        }
    }

    /// Enforce the clean-state precondition and move off protected branches.
    pub async fn guard(&self) -> Result<GuardResult> {
        if self.config.require_clean_state {
            let clean = self
                .checkpointer
                .is_clean_state()
                .await
                .context("failed to query working tree state")?;
            if !clean {
                return Err(OrchestratorError::DirtyWorkingTree.into());
            }
        }

        let original_branch = self
            .checkpointer
            .current_branch()
            .await
            .context("failed to query current branch")?;

        if !self.config.protected_branches.contains(&original_branch) {
            return Ok(GuardResult {
                original_branch,
                was_protected: false,
                working_branch: String::new(),
            });
        }

        let working_branch = format!(
            "{}{}-{}",
            self.config.working_branch_prefix,
            self.plan_basename,
            Utc::now().format("%Y%m%d-%H%M%S")
        );

        self.checkpointer
            .create_branch(&working_branch)
            .await
            .with_context(|| format!("failed to create working branch {working_branch}"))?;
        self.checkpointer
            .switch_branch(&working_branch)
            .await
            .with_context(|| format!("failed to switch to working branch {working_branch}"))?;

        info!(
            from = %original_branch,
            to = %working_branch,
            "moved off protected branch"
        );

        Ok(GuardResult {
            original_branch,
            was_protected: true,
            working_branch,
        })
    }
}

/// Nil-tolerant wrapper run once per orchestrator invocation, strictly
/// before the setup hook.
#[derive(Default)]
pub struct BranchGuardHook {
    guard: Option<BranchGuard>,
}

impl BranchGuardHook {
    pub fn new(guard: Option<BranchGuard>) -> Self {
        Self { guard }
    }

    /// Run the inner guard. An unconfigured hook is a no-op.
    pub async fn run(&self) -> Result<Option<GuardResult>> {
        match &self.guard {
            Some(guard) => guard.guard().await.map(Some),
            None => Ok(None),
        }
    }
}
