//! The `Invoker` trait -- the adapter interface for agent invocation.
//!
//! Each concrete invoker wraps a specific agent transport (a CLI binary,
//! an HTTP endpoint in tests, a scripted double) and translates it into
//! the common request/response [`Invocation`] shape. The trait is
//! intentionally object-safe so it can be stored as `Arc<dyn Invoker>`.

mod process;
mod registry;

pub use process::ProcessInvoker;
pub use registry::StaticAgentRegistry;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

/// Options applied to a single agent invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    /// Working directory for the agent process.
    pub working_dir: Option<PathBuf>,
    /// Wall-time limit for the invocation.
    pub timeout: Option<Duration>,
    /// Extra environment merged into the agent's process environment.
    pub env: HashMap<String, String>,
}

/// The raw outcome of one agent invocation.
///
/// `output` is opaque to the core; it is expected to be structured
/// (JSON-ish) when `exit_code` is 0.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub output: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Adapter interface for invoking an external agent with a prompt.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// Invoke `agent` with `prompt` and wait for it to finish.
    ///
    /// A non-zero exit code is not an `Err`: the invocation ran, the agent
    /// reported failure. `Err` means the invocation itself could not be
    /// carried out (spawn failure, timeout, transport error).
    async fn invoke(&self, agent: &str, prompt: &str, opts: &InvokeOptions) -> Result<Invocation>;
}

/// Registry of agent names known to the outer system.
///
/// Consulted by the QC selector so that language reviewers are only added
/// when they actually exist.
pub trait AgentRegistry: Send + Sync {
    fn has_agent(&self, name: &str) -> bool;
    fn list(&self) -> Vec<String>;
}

// Compile-time assertion: both traits must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Invoker, _: &dyn AgentRegistry) {}
};
