//! Git-backed checkpointer.
//!
//! Checkpoints are branches pointing at a snapshot commit. When the
//! working tree is dirty at checkpoint time the changes are committed
//! onto the checkpoint branch first, so a later restore recovers them.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command;
use tracing::debug;

use crate::model::CheckpointInfo;

use super::Checkpointer;

/// Default prefix for checkpoint branch names.
pub const CHECKPOINT_BRANCH_PREFIX: &str = "maestro-checkpoint-";

/// [`Checkpointer`] implementation that shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCheckpointer {
    repo_root: PathBuf,
    branch_prefix: String,
}

impl GitCheckpointer {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            branch_prefix: CHECKPOINT_BRANCH_PREFIX.to_owned(),
        }
    }

    /// Override the checkpoint branch prefix.
    pub fn with_branch_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.branch_prefix = prefix.into();
        self
    }

    /// Run a git subcommand in the repository root and return trimmed stdout.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .with_context(|| format!("failed to run git {}", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

#[async_trait]
impl Checkpointer for GitCheckpointer {
    async fn create_checkpoint(&self, task_number: &str) -> Result<CheckpointInfo> {
        let created_at = Utc::now();
        let branch_name = format!(
            "{}{}-{}",
            self.branch_prefix,
            task_number,
            created_at.format("%Y%m%d-%H%M%S")
        );

        // Snapshot uncommitted work if there is any.
        let dirty = !self.git(&["status", "--porcelain"]).await?.is_empty();
        if dirty {
            self.git(&["add", "-A"]).await?;
            let message = format!("checkpoint before task {task_number}");
            self.git(&["commit", "-m", &message]).await?;
        }

        let commit_hash = self.git(&["rev-parse", "HEAD"]).await?;
        self.git(&["branch", &branch_name, &commit_hash]).await?;

        debug!(task = task_number, branch = %branch_name, commit = %commit_hash, "created checkpoint");

        Ok(CheckpointInfo {
            branch_name,
            commit_hash,
            created_at,
        })
    }

    async fn restore_checkpoint(&self, commit_hash: &str) -> Result<()> {
        self.git(&["reset", "--hard", commit_hash]).await?;
        Ok(())
    }

    async fn delete_checkpoint(&self, branch_name: &str) -> Result<()> {
        self.git(&["branch", "-D", branch_name]).await?;
        Ok(())
    }

    async fn create_branch(&self, name: &str) -> Result<()> {
        self.git(&["branch", name]).await?;
        Ok(())
    }

    async fn switch_branch(&self, name: &str) -> Result<()> {
        self.git(&["checkout", name]).await?;
        Ok(())
    }

    async fn current_branch(&self) -> Result<String> {
        self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    async fn is_clean_state(&self) -> Result<bool> {
        Ok(self.git(&["status", "--porcelain"]).await?.is_empty())
    }
}
