//! Message adapter — formats user-facing notifications.
//!
//! Delivery itself happens through the output channel when the task
//! submits; this adapter only builds the payload, so even "just respond"
//! steps pass through the security gate like any other operation.

use async_trait::async_trait;
use serde_json::json;

use crate::domain::error::{Result, ValidationError};
use crate::security::sandbox::SandboxSession;
use crate::tools::{ToolAdapter, ToolKind};

/// Maximum notification length (characters).
const MAX_TEXT_LEN: usize = 16 * 1024;

pub struct MessageTool;

impl MessageTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MessageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolAdapter for MessageTool {
    fn name(&self) -> &str {
        "message"
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Message
    }

    fn validate(&self, params: &serde_json::Value) -> Result<()> {
        let text = params
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingParameter {
                tool: "message".to_string(),
                field: "text".to_string(),
            })?;
        if text.len() > MAX_TEXT_LEN {
            return Err(ValidationError::InvalidParameter {
                tool: "message".to_string(),
                reason: format!("text exceeds {MAX_TEXT_LEN} characters"),
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
        let text = params.get("text").and_then(|v| v.as_str()).unwrap_or("");
        let recipient = params
            .get("recipient")
            .and_then(|v| v.as_str())
            .unwrap_or("user");

        Ok(json!({
            "notification": text,
            "recipient": recipient,
        }))
    }

    fn sanitize_output(&self, mut result: serde_json::Value) -> serde_json::Value {
        // Notifications never carry raw control characters to the channel.
        if let Some(text) = result
            .get("notification")
            .and_then(|v| v.as_str())
            .map(|s| s.chars().filter(|c| !c.is_control() || *c == '\n').collect::<String>())
        {
            result["notification"] = json!(text);
        }
        result
    }
}
