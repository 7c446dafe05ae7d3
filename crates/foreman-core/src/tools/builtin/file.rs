//! File adapter — filesystem operations confined to the session workdir.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use crate::domain::error::{AgentError, Result, SecurityStage, ValidationError};
use crate::security::sandbox::SandboxSession;
use crate::tools::{ToolAdapter, ToolKind};

/// Maximum write size (bytes).
const MAX_WRITE_BYTES: usize = 1024 * 1024;

/// Absolute path prefixes reachable outside the session workdir.
const ALLOWED_ABSOLUTE_PREFIXES: &[&str] = &["/tmp"];

const ACTIONS: &[&str] = &["read", "write", "list", "exists"];

/// Adapter for read/write/list/exists operations.
pub struct FileTool;

impl FileTool {
    pub fn new() -> Self {
        Self
    }

    fn check_path(&self, path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(ValidationError::MissingParameter {
                tool: "file".to_string(),
                field: "path".to_string(),
            }
            .into());
        }
        // Path traversal is rejected regardless of where it would land.
        if path.split('/').any(|seg| seg == "..") {
            return Err(AgentError::Security {
                reason: format!("path traversal rejected: {path}"),
                stage: SecurityStage::Structural,
            });
        }
        if path.starts_with('/')
            && !ALLOWED_ABSOLUTE_PREFIXES
                .iter()
                .any(|p| path == *p || path.starts_with(&format!("{p}/")))
        {
            return Err(AgentError::Security {
                reason: format!("absolute path outside allowed roots: {path}"),
                stage: SecurityStage::Structural,
            });
        }
        Ok(())
    }

    fn resolve(&self, path: &str, session: &SandboxSession) -> PathBuf {
        if path.starts_with('/') {
            PathBuf::from(path)
        } else {
            session.workdir.join(path)
        }
    }
}

impl Default for FileTool {
    fn default() -> Self {
        Self::new()
    }
}

async fn list_dir(path: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(path).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[async_trait]
impl ToolAdapter for FileTool {
    fn name(&self) -> &str {
        "file"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::File
    }

    fn validate(&self, params: &serde_json::Value) -> Result<()> {
        let action = params
            .get("action")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "file".to_string(),
                field: "action".to_string(),
            })?;
        if !ACTIONS.contains(&action) {
            return Err(ValidationError::InvalidParameter {
                tool: "file".to_string(),
                reason: format!("unknown action: {action}"),
            }
            .into());
        }

        let path = params
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "file".to_string(),
                field: "path".to_string(),
            })?;
        self.check_path(path)?;

        if action == "write" {
            let content = params
                .get("content")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ValidationError::MissingParameter {
                    tool: "file".to_string(),
                    field: "content".to_string(),
                })?;
            if content.len() > MAX_WRITE_BYTES {
                return Err(ValidationError::InvalidParameter {
                    tool: "file".to_string(),
                    reason: format!("content exceeds {MAX_WRITE_BYTES} bytes"),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        session: &SandboxSession,
    ) -> Result<serde_json::Value> {
        let action = params.get("action").and_then(|v| v.as_str()).unwrap_or("");
        let path_str = params.get("path").and_then(|v| v.as_str()).unwrap_or("");
        let path = self.resolve(path_str, session);

        let io_err = |e: std::io::Error| AgentError::Execution {
            reason: format!("{action} {path_str}: {e}"),
            partial: None,
            attempts: 1,
        };

        match action {
            "read" => {
                let content = tokio::fs::read_to_string(&path).await.map_err(io_err)?;
                Ok(json!({ "path": path_str, "content": content }))
            }
            "write" => {
                if session.limits.fs_read_only {
                    return Err(AgentError::Security {
                        reason: "session filesystem is read-only".to_string(),
                        stage: SecurityStage::Gate,
                    });
                }
                let content = params
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                tokio::fs::write(&path, content).await.map_err(io_err)?;
                Ok(json!({ "path": path_str, "bytes_written": content.len() }))
            }
            "list" => {
                let entries = list_dir(&path).await.map_err(io_err)?;
                Ok(json!({ "path": path_str, "entries": entries }))
            }
            "exists" => {
                let exists = tokio::fs::try_exists(&path).await.map_err(io_err)?;
                Ok(json!({ "path": path_str, "exists": exists }))
            }
            other => Err(ValidationError::InvalidParameter {
                tool: "file".to_string(),
                reason: format!("unknown action: {other}"),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(params: serde_json::Value) -> Result<()> {
        FileTool::new().validate(&params)
    }

    #[test]
    fn rejects_path_traversal() {
        let err = validate(json!({"action": "read", "path": "../secrets"})).unwrap_err();
        assert!(matches!(
            err,
            AgentError::Security {
                stage: SecurityStage::Structural,
                ..
            }
        ));
    }

    #[test]
    fn rejects_absolute_path_outside_allowed_roots() {
        let err = validate(json!({"action": "list", "path": "/etc"})).unwrap_err();
        assert!(matches!(err, AgentError::Security { .. }));
        // /tmpfoo must not pass as a /tmp prefix.
        let err = validate(json!({"action": "list", "path": "/tmpfoo"})).unwrap_err();
        assert!(matches!(err, AgentError::Security { .. }));
    }

    #[test]
    fn accepts_tmp_and_relative_paths() {
        assert!(validate(json!({"action": "list", "path": "/tmp"})).is_ok());
        assert!(validate(json!({"action": "read", "path": "notes.txt"})).is_ok());
    }

    #[test]
    fn rejects_unknown_action() {
        let err = validate(json!({"action": "shred", "path": "x"})).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }

    #[test]
    fn rejects_oversized_write() {
        let big = "x".repeat(MAX_WRITE_BYTES + 1);
        let err = validate(json!({"action": "write", "path": "f", "content": big})).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
}
