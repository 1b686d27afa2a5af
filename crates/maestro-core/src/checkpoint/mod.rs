//! The `Checkpointer` trait -- abstract snapshot/branch operations.
//!
//! The core never shells out to git itself; it drives these seven
//! operations and lets the backend decide how they map onto a real
//! repository. [`GitCheckpointer`] is the stock backend.

mod git;

pub use git::GitCheckpointer;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::CheckpointInfo;

/// Abstract git-like operations consumed by rollback and branch guarding.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Snapshot the current state ahead of an attempt at `task_number`.
    async fn create_checkpoint(&self, task_number: &str) -> Result<CheckpointInfo>;

    /// Restore the working tree to `commit_hash`.
    async fn restore_checkpoint(&self, commit_hash: &str) -> Result<()>;

    /// Delete the checkpoint branch `branch_name`.
    async fn delete_checkpoint(&self, branch_name: &str) -> Result<()>;

    async fn create_branch(&self, name: &str) -> Result<()>;

    async fn switch_branch(&self, name: &str) -> Result<()>;

    async fn current_branch(&self) -> Result<String>;

    /// Whether the working tree has no uncommitted changes.
    async fn is_clean_state(&self) -> Result<bool>;
}

// Compile-time assertion: Checkpointer must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Checkpointer) {}
};
