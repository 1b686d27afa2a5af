//! Pre-wave and pre-task hooks.
//!
//! Every hook follows the graceful-degradation contract: an unconfigured
//! hook, a missing inner provider, or a provider error never panics and
//! never aborts execution. Gating hooks (guard protocol block decisions,
//! budget, branch guard) are the documented exceptions.

mod budget;
mod estimation;
mod guard_protocol;
mod pattern;
mod warmup;

pub use budget::BudgetTracker;
pub use estimation::{EstimateProvider, EstimationHook, HumanEstimate};
pub use guard_protocol::{GuardDecision, GuardProtocol};
pub use pattern::{
    PatternAssessment, PatternIntelligenceHook, PatternMode, PatternOutcome, PatternProvider,
};
pub use warmup::{HistoryEntry, TaskInfo, WarmUpContext, WarmUpHook, WarmUpProvider};

use anyhow::Result;
use async_trait::async_trait;

/// One-time setup run after the branch guard has succeeded, before any
/// wave starts. What it does is up to the outer system (environment
/// preparation, worktree priming).
#[async_trait]
pub trait SetupHook: Send + Sync {
    async fn run(&self) -> Result<()>;
}

// Compile-time assertion: the async hook traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn SetupHook, _: &dyn GuardProtocol) {}
};
