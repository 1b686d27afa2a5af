//! Plan utilities: structural validation, merging, and the updater port.

mod merge;
mod validate;

pub use merge::merge_plans;
pub use validate::validate_plan;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{Task, TaskResult};

/// Persists review feedback and status back into the plan file that owns
/// a task. The core never writes plan files itself.
#[async_trait]
pub trait PlanUpdater: Send + Sync {
    async fn update_task_feedback(&self, task: &Task, result: &TaskResult) -> Result<()>;
}

// Compile-time assertion: PlanUpdater must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn PlanUpdater) {}
};
