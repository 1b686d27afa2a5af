//! Failure analysis and adaptive agent substitution.
//!
//! Before each task the analyzer reads the learning store for prior
//! outcomes of the same `(plan, task)`; when retries accumulate the
//! swapper proposes an agent that has not been tried yet.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::Task;
use crate::store::{FailureAnalysis, LearningStore};

/// Reads historical outcomes for a task. Absent store or store errors
/// degrade to "no analysis".
pub struct FailureAnalyzer {
    store: Option<Arc<dyn LearningStore>>,
    min_attempts: u32,
}

impl FailureAnalyzer {
    pub fn new(store: Option<Arc<dyn LearningStore>>, min_attempts: u32) -> Self {
        Self {
            store,
            min_attempts,
        }
    }

    /// Analyze prior failures for `task` within `plan_file`.
    pub async fn analyze(&self, plan_file: Option<&Path>, task: &Task) -> Option<FailureAnalysis> {
        let store = self.store.as_ref()?;
        let plan_file = plan_file
            .or(task.source_file.as_deref())
            .map(|p| p.to_string_lossy().into_owned())?;

        match store
            .analyze_failures(&plan_file, &task.number, self.min_attempts)
            .await
        {
            Ok(analysis) => {
                if !analysis.common_patterns.is_empty() {
                    debug!(
                        task = %task.number,
                        patterns = ?analysis.common_patterns,
                        failed = analysis.failed_attempts,
                        "failure history found"
                    );
                }
                Some(analysis)
            }
            Err(e) => {
                warn!(task = %task.number, error = %e, "failure analysis unavailable");
                None
            }
        }
    }
}

/// Proposes a replacement agent once the current one keeps failing.
#[derive(Debug, Clone, Default)]
pub struct AgentSwapper {
    /// Candidate pool, in preference order.
    candidates: Vec<String>,
}

impl AgentSwapper {
    pub fn new(candidates: Vec<String>) -> Self {
        Self { candidates }
    }

    /// Propose a different agent, or `None` when nothing better is known.
    ///
    /// The analysis's own suggestion wins when it is untried; otherwise
    /// the first candidate not yet tried is proposed. The current agent
    /// is never proposed.
    pub fn propose(&self, analysis: &FailureAnalysis, current_agent: &str) -> Option<String> {
        if !analysis.should_try_different_agent {
            return None;
        }

        if let Some(suggested) = &analysis.suggested_agent
            && suggested != current_agent
            && !analysis.tried_agents.iter().any(|a| a == suggested)
        {
            return Some(suggested.clone());
        }

        self.candidates
            .iter()
            .find(|c| c.as_str() != current_agent && !analysis.tried_agents.iter().any(|a| a == *c))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(tried: &[&str], suggested: Option<&str>) -> FailureAnalysis {
        FailureAnalysis {
            total_attempts: 3,
            failed_attempts: 3,
            tried_agents: tried.iter().map(|a| a.to_string()).collect(),
            common_patterns: vec![],
            should_try_different_agent: true,
            suggested_agent: suggested.map(str::to_owned),
        }
    }

    #[test]
    fn no_proposal_when_history_is_healthy() {
        let swapper = AgentSwapper::new(vec!["rust-pro".to_owned()]);
        let mut a = analysis(&["backend-developer"], None);
        a.should_try_different_agent = false;
        assert_eq!(swapper.propose(&a, "backend-developer"), None);
    }

    #[test]
    fn analysis_suggestion_wins_when_untried() {
        let swapper = AgentSwapper::new(vec!["rust-pro".to_owned()]);
        let a = analysis(&["backend-developer"], Some("golang-pro"));
        assert_eq!(
            swapper.propose(&a, "backend-developer").as_deref(),
            Some("golang-pro")
        );
    }

    #[test]
    fn tried_suggestion_falls_through_to_candidates() {
        let swapper = AgentSwapper::new(vec!["rust-pro".to_owned(), "golang-pro".to_owned()]);
        let a = analysis(&["backend-developer", "rust-pro"], Some("rust-pro"));
        assert_eq!(
            swapper.propose(&a, "backend-developer").as_deref(),
            Some("golang-pro")
        );
    }

    #[test]
    fn never_proposes_the_current_agent() {
        let swapper = AgentSwapper::new(vec!["rust-pro".to_owned()]);
        let a = analysis(&[], Some("rust-pro"));
        assert_eq!(swapper.propose(&a, "rust-pro"), None);
    }

    #[test]
    fn exhausted_pool_proposes_nothing() {
        let swapper = AgentSwapper::new(vec!["a".to_owned(), "b".to_owned()]);
        let a = analysis(&["a", "b"], None);
        assert_eq!(swapper.propose(&a, "c"), None);
    }
}
