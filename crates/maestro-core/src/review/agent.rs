//! Reviewer that delegates to a reviewing agent through an [`Invoker`].
//!
//! The reviewing agent receives the task context and the worker's output
//! and is asked to answer with a JSON verdict. Parsing is deliberately
//! lenient: real agents wrap JSON in prose, and a bare GREEN/YELLOW/RED
//! token is accepted as a fallback.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::invoke::{InvokeOptions, Invoker};
use crate::model::{Task, Verdict};

use super::{ReviewResult, Reviewer};

/// QC reviewer backed by an agent invocation.
pub struct AgentReviewer {
    invoker: Arc<dyn Invoker>,
}

impl AgentReviewer {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self { invoker }
    }

    fn build_prompt(task: &Task, output: &str) -> String {
        let criteria = if task.criteria.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = task
                .criteria
                .iter()
                .map(|c| match &c.verification_command {
                    Some(cmd) => format!("- {} (verify: `{}`)", c.description, cmd),
                    None => format!("- {}", c.description),
                })
                .collect();
            format!("\nAcceptance criteria:\n{}\n", lines.join("\n"))
        };

        format!(
            "Review the following work for task {number} ({name}).\n\
             Task description:\n{prompt}\n{criteria}\n\
             Worker output:\n{output}\n\n\
             Respond with a JSON object: {{\"flag\": \"GREEN|YELLOW|RED\", \
             \"feedback\": \"...\", \"suggested_agent\": null, \"retry\": false}}",
            number = task.number,
            name = task.name,
            prompt = task.prompt,
        )
    }
}

/// Extract a review verdict from an agent's free-form reply.
///
/// Tries each line as a JSON object first, then falls back to scanning
/// for a bare verdict token.
fn parse_review_output(agent_name: &str, raw: &str) -> Option<ReviewResult> {
    for line in raw.lines() {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            continue;
        }
        let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) else {
            continue;
        };
        let Some(flag) = v
            .get("flag")
            .or_else(|| v.get("verdict"))
            .and_then(|f| f.as_str())
            .and_then(|f| f.parse::<Verdict>().ok())
        else {
            continue;
        };
        return Some(ReviewResult {
            flag,
            feedback: v
                .get("feedback")
                .and_then(|f| f.as_str())
                .unwrap_or_default()
                .to_owned(),
            suggested_agent: v
                .get("suggested_agent")
                .and_then(|a| a.as_str())
                .filter(|a| !a.is_empty())
                .map(str::to_owned),
            retry: v.get("retry").and_then(|r| r.as_bool()).unwrap_or(false),
            agent_name: agent_name.to_owned(),
        });
    }

    // Fallback: a bare verdict token anywhere in the reply.
    for token in ["RED", "YELLOW", "GREEN"] {
        if raw.contains(token) {
            return Some(ReviewResult {
                flag: token.parse().ok()?,
                feedback: raw.trim().to_owned(),
                suggested_agent: None,
                retry: token == "RED",
                agent_name: agent_name.to_owned(),
            });
        }
    }
    None
}

#[async_trait]
impl Reviewer for AgentReviewer {
    async fn review(&self, task: &Task, agent_name: &str, output: &str) -> Result<ReviewResult> {
        let prompt = Self::build_prompt(task, output);
        let invocation = self
            .invoker
            .invoke(agent_name, &prompt, &InvokeOptions::default())
            .await
            .with_context(|| format!("reviewer {agent_name} failed for task {}", task.number))?;

        match parse_review_output(agent_name, &invocation.output) {
            Some(result) => Ok(result),
            None => {
                warn!(
                    reviewer = agent_name,
                    task = %task.number,
                    "reviewer produced no parseable verdict, treating as YELLOW"
                );
                Ok(ReviewResult {
                    flag: Verdict::Yellow,
                    feedback: invocation.output,
                    suggested_agent: None,
                    retry: false,
                    agent_name: agent_name.to_owned(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_json_verdict() {
        let raw = r#"Here is my review.
{"flag":"RED","feedback":"tests missing","suggested_agent":"golang-pro","retry":true}
"#;
        let result = parse_review_output("quality-control", raw).unwrap();
        assert_eq!(result.flag, Verdict::Red);
        assert_eq!(result.feedback, "tests missing");
        assert_eq!(result.suggested_agent.as_deref(), Some("golang-pro"));
        assert!(result.retry);
        assert_eq!(result.agent_name, "quality-control");
    }

    #[test]
    fn parse_accepts_verdict_key() {
        let raw = r#"{"verdict":"YELLOW","feedback":"minor nits"}"#;
        let result = parse_review_output("qc", raw).unwrap();
        assert_eq!(result.flag, Verdict::Yellow);
        assert!(!result.retry);
    }

    #[test]
    fn parse_empty_suggested_agent_is_none() {
        let raw = r#"{"flag":"GREEN","feedback":"","suggested_agent":""}"#;
        let result = parse_review_output("qc", raw).unwrap();
        assert!(result.suggested_agent.is_none());
    }

    #[test]
    fn parse_bare_token_fallback() {
        let result = parse_review_output("qc", "Overall this looks RED to me.").unwrap();
        assert_eq!(result.flag, Verdict::Red);
        assert!(result.retry);
    }

    #[test]
    fn parse_garbage_returns_none() {
        assert!(parse_review_output("qc", "no verdict here").is_none());
    }
}
