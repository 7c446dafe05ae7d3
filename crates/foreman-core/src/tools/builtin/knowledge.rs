//! Knowledge adapter — queries the retriever collaborator and merges
//! results under the fact-priority policy.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::collab::{merge_facts, KnowledgeRetriever};
use crate::domain::error::{Result, ValidationError};
use crate::security::sandbox::SandboxSession;
use crate::tools::{ToolAdapter, ToolKind};

/// Queries longer than this are rejected before retrieval.
const MAX_QUERY_LEN: usize = 2048;

pub struct KnowledgeTool {
    retriever: Arc<dyn KnowledgeRetriever>,
}

impl KnowledgeTool {
    pub fn new(retriever: Arc<dyn KnowledgeRetriever>) -> Self {
        Self { retriever }
    }
}

#[async_trait]
impl ToolAdapter for KnowledgeTool {
    fn name(&self) -> &str {
        "knowledge"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Knowledge
    }

    fn validate(&self, params: &serde_json::Value) -> Result<()> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "knowledge".to_string(),
                field: "query".to_string(),
            })?;
        if query.trim().is_empty() {
            return Err(ValidationError::MissingParameter {
                tool: "knowledge".to_string(),
                field: "query".to_string(),
            }
            .into());
        }
        if query.len() > MAX_QUERY_LEN {
            return Err(ValidationError::InvalidParameter {
                tool: "knowledge".to_string(),
                reason: format!("query exceeds {MAX_QUERY_LEN} characters"),
            }
            .into());
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        _session: &SandboxSession,
    ) -> Result<serde_json::Value> {
        let query = params.get("query").and_then(|v| v.as_str()).unwrap_or("");
        let facts = self.retriever.retrieve(query).await?;
        let merged = merge_facts(facts);

        Ok(json!({
            "query": query,
            "facts": merged,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{RankedFact, SourceClass};

    struct FixedRetriever(Vec<RankedFact>);

    #[async_trait]
    impl KnowledgeRetriever for FixedRetriever {
        async fn retrieve(&self, _query: &str) -> Result<Vec<RankedFact>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn validate_requires_nonempty_query() {
        let tool = KnowledgeTool::new(Arc::new(FixedRetriever(vec![])));
        assert!(tool.validate(&json!({"query": "rust"})).is_ok());
        assert!(tool.validate(&json!({"query": "  "})).is_err());
        assert!(tool.validate(&json!({})).is_err());
    }

    #[test]
    fn conflicting_facts_resolve_by_source_priority() {
        // Checked at the merge layer; the adapter output carries the
        // already-resolved list.
        let facts = vec![
            RankedFact {
                key: "release".into(),
                content: "from cache".into(),
                source: SourceClass::Internal,
                score: 0.9,
            },
            RankedFact {
                key: "release".into(),
                content: "from registry".into(),
                source: SourceClass::Authoritative,
                score: 0.5,
            },
        ];
        let merged = merge_facts(facts);
        assert_eq!(merged[0].content, "from registry");
    }
}
