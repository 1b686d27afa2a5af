//! Reviewer selection: which agents review a task's output.

use std::path::Path;

use crate::config::{QualityControlConfig, SelectionMode};
use crate::invoke::AgentRegistry;
use crate::model::Task;

/// The reviewer every auto-selection starts from.
pub const BASELINE_REVIEWER: &str = "quality-control";

/// Map a file extension to its language reviewer.
fn language_agent(extension: &str) -> Option<&'static str> {
    match extension {
        "go" => Some("golang-pro"),
        "py" => Some("python-pro"),
        "ts" | "tsx" => Some("typescript-pro"),
        "js" | "jsx" => Some("javascript-pro"),
        "rs" => Some("rust-pro"),
        "java" => Some("java-pro"),
        "rb" => Some("ruby-pro"),
        "cs" => Some("csharp-pro"),
        "c" | "cc" | "cpp" | "cxx" | "h" | "hpp" => Some("cpp-pro"),
        "swift" => Some("swift-expert"),
        "kt" | "kts" => Some("kotlin-specialist"),
        "php" => Some("php-pro"),
        "ex" | "exs" => Some("elixir-pro"),
        "scala" => Some("scala-pro"),
        "sql" => Some("sql-pro"),
        _ => None,
    }
}

/// Select the reviewing agents for `task`.
///
/// `registry` gates language agents: one is only added when the registry
/// reports it exists. A missing registry is treated as "everything
/// exists" so an unwired registry never silences reviews. Blocked agents
/// are filtered from the final list in every mode; the baseline reviewer
/// is blockable, so the result may be empty.
pub fn select_reviewers(
    task: &Task,
    config: &QualityControlConfig,
    registry: Option<&dyn AgentRegistry>,
) -> Vec<String> {
    let mut selected = match config.mode {
        SelectionMode::Explicit => config.explicit_agents.clone(),
        SelectionMode::Auto => auto_select(task, registry),
        SelectionMode::Mixed => {
            let mut agents = auto_select(task, registry);
            for extra in &config.additional_agents {
                if !agents.contains(extra) {
                    agents.push(extra.clone());
                }
            }
            agents
        }
    };

    selected.retain(|agent| !config.blocked_agents.contains(agent));
    selected
}

/// Baseline reviewer plus one language agent per distinct file extension.
fn auto_select(task: &Task, registry: Option<&dyn AgentRegistry>) -> Vec<String> {
    let mut agents = vec![BASELINE_REVIEWER.to_owned()];

    for file in &task.files {
        let Some(extension) = Path::new(file).extension().and_then(|e| e.to_str()) else {
            continue;
        };
        let Some(agent) = language_agent(&extension.to_ascii_lowercase()) else {
            continue;
        };
        let exists = registry.is_none_or(|r| r.has_agent(agent));
        if exists && !agents.iter().any(|a| a == agent) {
            agents.push(agent.to_owned());
        }
    }

    agents
}
