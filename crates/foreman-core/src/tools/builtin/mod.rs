//! Builtin tool adapters.

pub mod file;
pub mod knowledge;
pub mod message;
pub mod shell;

use std::sync::Arc;

use crate::collab::KnowledgeRetriever;

use super::ToolRegistry;

pub use file::FileTool;
pub use knowledge::KnowledgeTool;
pub use message::MessageTool;
pub use shell::ShellTool;

/// The standard registry: shell, file, message, and knowledge adapters.
pub fn standard_registry(retriever: Arc<dyn KnowledgeRetriever>) -> ToolRegistry {
    ToolRegistry::new()
        .register(Arc::new(ShellTool::new()))
        .register(Arc::new(FileTool::new()))
        .register(Arc::new(MessageTool::new()))
        .register(Arc::new(KnowledgeTool::new(retriever)))
}
