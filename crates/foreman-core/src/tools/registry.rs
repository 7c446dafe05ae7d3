//! Tool registry — name to adapter lookup.
//!
//! Built once at startup and read-only thereafter, so concurrent lookups
//! need no synchronization. Unknown names surface before any security
//! decision is produced.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::error::{AgentError, Result};

use super::ToolAdapter;

/// Immutable name -> adapter table.
#[derive(Default)]
pub struct ToolRegistry {
    adapters: HashMap<String, Arc<dyn ToolAdapter>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter under its own name (builder pattern).
    pub fn register(mut self, adapter: Arc<dyn ToolAdapter>) -> Self {
        self.adapters.insert(adapter.name().to_string(), adapter);
        self
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolAdapter>> {
        self.adapters.get(name).cloned()
    }

    /// Look up an adapter, failing with `ToolNotFound` for unknown names.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ToolAdapter>> {
        self.get(name).ok_or_else(|| AgentError::ToolNotFound {
            name: name.to_string(),
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::builtin::MessageTool;

    #[test]
    fn lookup_unknown_name_fails() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("teleport").unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound { name } if name == "teleport"));
    }

    #[test]
    fn register_then_lookup() {
        let registry = ToolRegistry::new().register(Arc::new(MessageTool::new()));
        let adapter = registry.lookup("message").unwrap();
        assert_eq!(adapter.name(), "message");
        assert_eq!(registry.names(), vec!["message"]);
    }

    #[test]
    fn register_same_name_replaces() {
        let registry = ToolRegistry::new()
            .register(Arc::new(MessageTool::new()))
            .register(Arc::new(MessageTool::new()));
        assert_eq!(registry.len(), 1);
    }
}
