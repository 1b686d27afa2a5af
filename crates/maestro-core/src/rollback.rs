//! Rollback manager: decides when a failed attempt restores a checkpoint
//! and performs the restoration.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use tracing::{info, warn};

use crate::checkpoint::Checkpointer;
use crate::config::{RollbackConfig, RollbackMode};
use crate::model::{CheckpointInfo, Verdict};

/// Decides and performs checkpoint restoration.
pub struct RollbackManager {
    config: RollbackConfig,
    checkpointer: Option<Arc<dyn Checkpointer>>,
}

impl RollbackManager {
    pub fn new(config: RollbackConfig, checkpointer: Option<Arc<dyn Checkpointer>>) -> Self {
        Self {
            config,
            checkpointer,
        }
    }

    /// Disabled manager: never rolls back.
    pub fn disabled() -> Self {
        Self::new(RollbackConfig::default(), None)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && self.checkpointer.is_some()
    }

    /// Pure decision function.
    ///
    /// `max_retries` is the number of retries after the initial attempt;
    /// `attempt` is 1-based.
    pub fn should_rollback(&self, verdict: Verdict, attempt: u32, max_retries: u32) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.config.mode {
            RollbackMode::Manual | RollbackMode::Unknown => false,
            RollbackMode::AutoOnRed => verdict == Verdict::Red,
            RollbackMode::AutoOnMaxRetries => verdict == Verdict::Red && attempt > max_retries,
        }
    }

    /// Restore the working tree to `checkpoint`.
    pub async fn perform_rollback(&self, checkpoint: Option<&CheckpointInfo>) -> Result<()> {
        let Some(checkpoint) = checkpoint else {
            bail!("cannot roll back: no checkpoint was captured");
        };
        if checkpoint.commit_hash.is_empty() {
            bail!("cannot roll back: checkpoint has no commit hash");
        }
        let Some(checkpointer) = &self.checkpointer else {
            bail!("cannot roll back: no checkpointer configured");
        };

        info!(
            branch = %checkpoint.branch_name,
            commit = %checkpoint.commit_hash,
            "rolling back to checkpoint"
        );

        if let Err(e) = checkpointer.restore_checkpoint(&checkpoint.commit_hash).await {
            warn!(commit = %checkpoint.commit_hash, error = %e, "checkpoint restore failed");
            return Err(anyhow!("failed to restore checkpoint: {e}"));
        }

        Ok(())
    }
}
