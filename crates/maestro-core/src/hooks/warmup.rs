//! Warm-up context injection.
//!
//! Asks a provider for similar-task context and prepends it to the task
//! prompt as a fenced block. Low-confidence or absent context is skipped.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::Task;

/// Confidence below which warm-up context is discarded.
const MIN_CONFIDENCE: f64 = 0.3;

/// Maximum similar patterns included in the injected block.
const MAX_PATTERNS: usize = 5;

/// Maximum successful examples summarised in the injected block.
const MAX_EXAMPLES: usize = 3;

/// What the provider gets to look up context with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub number: String,
    pub name: String,
    /// Files the task touches, derived from the task plus heuristics over
    /// criterion verification commands.
    pub file_paths: Vec<String>,
    pub plan_file: Option<PathBuf>,
}

/// One historical execution the provider considered relevant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub task_name: String,
    pub agent: String,
    pub success: bool,
    pub qc_verdict: Option<String>,
}

/// Context retrieved for a task about to run.
#[derive(Debug, Clone, PartialEq)]
pub struct WarmUpContext {
    /// In `[0, 1]`.
    pub confidence: f64,
    pub recommended_approach: String,
    pub similar_patterns: Vec<String>,
    pub relevant_history: Vec<HistoryEntry>,
}

/// Supplies warm-up context for a task. `Ok(None)` means "nothing known".
#[async_trait]
pub trait WarmUpProvider: Send + Sync {
    async fn warm_up(&self, info: &TaskInfo) -> Result<Option<WarmUpContext>>;
}

/// Pre-task hook that prepends warm-up context to the prompt.
pub struct WarmUpHook {
    provider: Arc<dyn WarmUpProvider>,
}

impl WarmUpHook {
    pub fn new(provider: Arc<dyn WarmUpProvider>) -> Self {
        Self { provider }
    }

    /// Fetch context for `task` and prepend it to the prompt.
    ///
    /// Degrades gracefully: provider errors and low-confidence context
    /// leave the prompt untouched.
    pub async fn inject(&self, task: &mut Task) {
        let info = build_task_info(task);
        let context = match self.provider.warm_up(&info).await {
            Ok(Some(context)) => context,
            Ok(None) => return,
            Err(e) => {
                warn!(task = %task.number, error = %e, "warm-up provider failed");
                return;
            }
        };

        if context.confidence < MIN_CONFIDENCE {
            debug!(
                task = %task.number,
                confidence = context.confidence,
                "warm-up confidence too low, skipping"
            );
            return;
        }

        let block = format_context(&context);
        task.prompt = format!("{block}\n{}", task.prompt);
    }
}

/// Derive the provider's lookup key from a task.
pub fn build_task_info(task: &Task) -> TaskInfo {
    let mut file_paths = task.files.clone();

    // Files named in metadata.
    if let Some(serde_json::Value::Array(entries)) = task.metadata.get("files") {
        for entry in entries {
            if let Some(path) = entry.as_str()
                && !file_paths.iter().any(|f| f == path)
            {
                file_paths.push(path.to_owned());
            }
        }
    }

    // Heuristic: path-looking tokens inside criterion verification commands.
    for criterion in &task.criteria {
        let Some(command) = &criterion.verification_command else {
            continue;
        };
        for token in command.split_whitespace() {
            let token = token.trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if looks_like_source_path(token) && !file_paths.iter().any(|f| f == token) {
                file_paths.push(token.to_owned());
            }
        }
    }

    TaskInfo {
        number: task.number.clone(),
        name: task.name.clone(),
        file_paths,
        plan_file: task.source_file.clone(),
    }
}

fn looks_like_source_path(token: &str) -> bool {
    const SOURCE_EXTENSIONS: &[&str] = &[
        ".rs", ".go", ".py", ".ts", ".tsx", ".js", ".jsx", ".java", ".rb", ".c", ".cc", ".cpp",
        ".h", ".hpp", ".swift", ".kt", ".php", ".ex", ".scala", ".sql", ".toml", ".yaml", ".yml",
    ];
    token.contains('/') && SOURCE_EXTENSIONS.iter().any(|ext| token.ends_with(ext))
}

/// Render the fenced warm-up block prepended to the prompt.
fn format_context(context: &WarmUpContext) -> String {
    let mut block = String::from("--- WARM-UP CONTEXT ---\n");
    block.push_str(&format!(
        "Confidence: {:.0}%\n",
        context.confidence * 100.0
    ));
    block.push_str(&format!(
        "Recommended approach: {}\n",
        context.recommended_approach
    ));

    if !context.similar_patterns.is_empty() {
        block.push_str("Similar patterns:\n");
        for pattern in context.similar_patterns.iter().take(MAX_PATTERNS) {
            block.push_str(&format!("- {pattern}\n"));
        }
    }

    if !context.relevant_history.is_empty() {
        let successes = context.relevant_history.iter().filter(|h| h.success).count();
        let failures = context.relevant_history.len() - successes;
        block.push_str(&format!(
            "History: {successes} succeeded, {failures} failed\n"
        ));
        for entry in context
            .relevant_history
            .iter()
            .filter(|h| h.success)
            .take(MAX_EXAMPLES)
        {
            let verdict = entry.qc_verdict.as_deref().unwrap_or("GREEN");
            block.push_str(&format!(
                "- {} via {} ({verdict})\n",
                entry.task_name, entry.agent
            ));
        }
    }

    block.push_str("--- END WARM-UP ---\n");
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Criterion;

    struct FixedProvider(Option<WarmUpContext>);

    #[async_trait]
    impl WarmUpProvider for FixedProvider {
        async fn warm_up(&self, _info: &TaskInfo) -> Result<Option<WarmUpContext>> {
            Ok(self.0.clone())
        }
    }

    fn context(confidence: f64) -> WarmUpContext {
        WarmUpContext {
            confidence,
            recommended_approach: "reuse the parser helpers".to_owned(),
            similar_patterns: (0..8).map(|i| format!("pattern-{i}")).collect(),
            relevant_history: vec![
                HistoryEntry {
                    task_name: "add lexer".to_owned(),
                    agent: "rust-pro".to_owned(),
                    success: true,
                    qc_verdict: Some("GREEN".to_owned()),
                },
                HistoryEntry {
                    task_name: "add parser".to_owned(),
                    agent: "backend-developer".to_owned(),
                    success: false,
                    qc_verdict: Some("RED".to_owned()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn injects_fenced_block_before_prompt() {
        let hook = WarmUpHook::new(Arc::new(FixedProvider(Some(context(0.9)))));
        let mut task = Task::new("1", "t", "original prompt");
        hook.inject(&mut task).await;

        assert!(task.prompt.starts_with("--- WARM-UP CONTEXT ---"));
        assert!(task.prompt.contains("Confidence: 90%"));
        assert!(task.prompt.contains("--- END WARM-UP ---"));
        assert!(task.prompt.ends_with("original prompt"));
        assert!(task.prompt.contains("History: 1 succeeded, 1 failed"));
    }

    #[tokio::test]
    async fn patterns_are_capped_at_five() {
        let hook = WarmUpHook::new(Arc::new(FixedProvider(Some(context(0.9)))));
        let mut task = Task::new("1", "t", "p");
        hook.inject(&mut task).await;

        assert!(task.prompt.contains("pattern-4"));
        assert!(!task.prompt.contains("pattern-5"));
    }

    #[tokio::test]
    async fn low_confidence_is_skipped() {
        let hook = WarmUpHook::new(Arc::new(FixedProvider(Some(context(0.2)))));
        let mut task = Task::new("1", "t", "original prompt");
        hook.inject(&mut task).await;
        assert_eq!(task.prompt, "original prompt");
    }

    #[tokio::test]
    async fn absent_context_is_skipped() {
        let hook = WarmUpHook::new(Arc::new(FixedProvider(None)));
        let mut task = Task::new("1", "t", "original prompt");
        hook.inject(&mut task).await;
        assert_eq!(task.prompt, "original prompt");
    }

    #[test]
    fn task_info_derives_files_from_criteria() {
        let mut task = Task::new("1", "t", "p");
        task.files = vec!["src/lib.rs".to_owned()];
        task.criteria = vec![Criterion {
            description: "compiles".to_owned(),
            verification_command: Some("cargo check src/parser.rs".to_owned()),
        }];
        task.metadata.insert(
            "files".to_owned(),
            serde_json::json!(["src/ast.rs", "src/lib.rs"]),
        );

        let info = build_task_info(&task);
        assert_eq!(
            info.file_paths,
            vec!["src/lib.rs", "src/ast.rs", "src/parser.rs"]
        );
    }
}
