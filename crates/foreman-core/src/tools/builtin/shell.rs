//! Shell adapter — command execution with structural denylist checks.

use std::process::Stdio;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::domain::error::{AgentError, Result, SecurityStage, ValidationError};
use crate::security::sandbox::SandboxSession;
use crate::security::validator::PermissionLevel;
use crate::tools::{ToolAdapter, ToolKind};

/// Captured stdout/stderr beyond this many bytes is truncated.
const OUTPUT_CAP: usize = 64 * 1024;

/// Commands matching any of these are rejected outright.
fn denied_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"rm\s+-rf",
            r"\bmkfs",
            r"\bdd\s+if=",
            r"chmod\s+777",
            r"chown\s+.*root",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
    })
}

/// First words a command may start with. Anything else is rejected.
const ALLOWED_PREFIXES: &[&str] = &[
    "echo", "cat", "grep", "find", "ls", "pwd", "wc", "head", "tail",
];

/// Adapter for sandboxed shell command execution.
pub struct ShellTool;

impl ShellTool {
    pub fn new() -> Self {
        Self
    }

    fn check_command(&self, command: &str) -> Result<()> {
        for pattern in denied_patterns() {
            if pattern.is_match(command) {
                return Err(AgentError::Security {
                    reason: format!("command matches denied pattern: {pattern}"),
                    stage: SecurityStage::Structural,
                });
            }
        }

        let first_word = command.split_whitespace().next().unwrap_or("");
        if !ALLOWED_PREFIXES.contains(&first_word) {
            return Err(AgentError::Security {
                reason: format!("command prefix not allowed: {first_word}"),
                stage: SecurityStage::Structural,
            });
        }
        Ok(())
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.len() <= OUTPUT_CAP {
        text.into_owned()
    } else {
        let mut cut = OUTPUT_CAP;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}\n[truncated {} bytes]", &text[..cut], text.len() - cut)
    }
}

#[async_trait]
impl ToolAdapter for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Shell
    }

    fn required_level(&self) -> PermissionLevel {
        PermissionLevel::Admin
    }

    fn validate(&self, params: &serde_json::Value) -> Result<()> {
        let command = params
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "shell".to_string(),
                field: "command".to_string(),
            })?;

        if let Some(dir) = params.get("working_dir") {
            let dir = dir.as_str().ok_or_else(|| ValidationError::InvalidParameter {
                tool: "shell".to_string(),
                reason: "working_dir must be a string".to_string(),
            })?;
            if dir.contains("..") || dir.starts_with('/') {
                return Err(AgentError::Security {
                    reason: format!("working_dir escapes the sandbox: {dir}"),
                    stage: SecurityStage::Structural,
                });
            }
        }

        self.check_command(command)
    }

    async fn execute(
        &self,
        params: &serde_json::Value,
        session: &SandboxSession,
    ) -> Result<serde_json::Value> {
        let command = params
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "shell".to_string(),
                field: "command".to_string(),
            })?;
        let workdir = match params.get("working_dir").and_then(|v| v.as_str()) {
            Some(rel) => session.workdir.join(rel),
            None => session.workdir.clone(),
        };

        debug!(session_id = %session.session_id, command, "executing shell command");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&workdir)
            .env_clear()
            .env("PATH", "/usr/bin:/bin")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AgentError::Execution {
                reason: format!("failed to spawn command: {e}"),
                partial: None,
                attempts: 1,
            })?;

        let stdout = truncate_output(&output.stdout);
        let stderr = truncate_output(&output.stderr);
        session.buffer_partial(json!({ "stdout": stdout, "stderr": stderr }));

        if !output.status.success() {
            return Err(AgentError::Execution {
                reason: format!(
                    "command exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.lines().next().unwrap_or(""),
                ),
                partial: Some(json!({ "stdout": stdout, "stderr": stderr })),
                attempts: 1,
            });
        }

        Ok(json!({
            "command": command,
            "exit_code": 0,
            "stdout": stdout,
            "stderr": stderr,
        }))
    }

    fn sanitize_output(&self, mut result: serde_json::Value) -> serde_json::Value {
        // Drop the echo of the command environment; keep only the streams.
        if let Some(obj) = result.as_object_mut() {
            obj.remove("env");
        }
        result
    }
}
