//! A static, in-memory [`AgentRegistry`].

use std::collections::BTreeSet;

use super::AgentRegistry;

/// Registry backed by a fixed set of agent names.
///
/// The outer layers typically build this from configuration (the roster of
/// installed agent definitions) and hand it to the core.
#[derive(Debug, Clone, Default)]
pub struct StaticAgentRegistry {
    agents: BTreeSet<String>,
}

impl StaticAgentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent name. Re-registering is a no-op.
    pub fn register(&mut self, name: impl Into<String>) {
        self.agents.insert(name.into());
    }
}

impl<S: Into<String>> FromIterator<S> for StaticAgentRegistry {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            agents: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl AgentRegistry for StaticAgentRegistry {
    fn has_agent(&self, name: &str) -> bool {
        self.agents.contains(name)
    }

    fn list(&self) -> Vec<String> {
        self.agents.iter().cloned().collect()
    }
}
