//! Subprocess-backed invoker.
//!
//! Spawns an agent CLI (`<binary> --agent <name> -p`), writes the prompt
//! to stdin, and collects stdout until the process exits. The agent name
//! travels as a flag so one binary can host many agent definitions.

use std::process::Stdio;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::OrchestratorError;

use super::{Invocation, InvokeOptions, Invoker};

/// Invoker that shells out to an agent binary.
#[derive(Debug, Clone)]
pub struct ProcessInvoker {
    /// Path to the agent binary. Defaults to `"claude"` (found via `$PATH`).
    binary_path: String,
}

impl ProcessInvoker {
    /// Create an invoker that will look for the default binary on `$PATH`.
    pub fn new() -> Self {
        Self {
            binary_path: "claude".to_owned(),
        }
    }

    /// Create an invoker with a custom binary path.
    ///
    /// Useful for testing or when the agent CLI is installed in a
    /// non-standard location.
    pub fn with_binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: path.into(),
        }
    }
}

impl Default for ProcessInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Invoker for ProcessInvoker {
    async fn invoke(&self, agent: &str, prompt: &str, opts: &InvokeOptions) -> Result<Invocation> {
        let started = Instant::now();

        let mut cmd = Command::new(&self.binary_path);
        cmd.arg("--agent").arg(agent).arg("-p");

        if let Some(dir) = &opts.working_dir {
            cmd.current_dir(dir);
        }
        // Merge, don't replace the entire env.
        for (key, value) in &opts.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn agent binary at '{}' -- is it installed and on PATH?",
                self.binary_path
            )
        })?;

        // Write the prompt and close stdin so the agent starts processing.
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!(agent, error = %e, "failed to write prompt to agent stdin");
            }
            drop(stdin);
        }

        let wait = child.wait_with_output();
        let output = match opts.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    // kill_on_drop reaps the child.
                    return Err(OrchestratorError::Timeout {
                        phase: format!("agent invocation ({agent})"),
                        timeout: limit,
                    }
                    .into());
                }
            },
            None => wait.await,
        }
        .with_context(|| format!("failed to collect output from agent {agent}"))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if exit_code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(agent, exit_code, stderr = %stderr, "agent exited non-zero");
        }

        Ok(Invocation {
            output: stdout,
            exit_code,
            duration: started.elapsed(),
        })
    }
}
