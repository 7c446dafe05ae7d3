//! Tool adapters — the capability surface the controller dispatches to.
//!
//! Adapters are passive: they never call the security manager themselves,
//! the manager always calls them. Beyond the generic permission gate, each
//! adapter enforces its own structural checks (path traversal rejection,
//! command denylists) as defense in depth.

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::Result;
use crate::security::sandbox::SandboxSession;
use crate::security::validator::PermissionLevel;

/// What kind of capability a tool exercises. Closed set: the permission
/// and resource-limit tables key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Shell,
    File,
    Message,
    Knowledge,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Shell,
        ToolKind::File,
        ToolKind::Message,
        ToolKind::Knowledge,
    ];
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ToolKind::Shell => "shell",
            ToolKind::File => "file",
            ToolKind::Message => "message",
            ToolKind::Knowledge => "knowledge",
        };
        write!(f, "{s}")
    }
}

/// A named, typed capability the controller can dispatch operations to.
///
/// The security manager drives the full lifecycle: `validate` before any
/// decision is made, `execute` inside a configured sandbox session, and
/// `sanitize_output` on the raw result before anything leaves the gate.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    /// Registry name (e.g. "shell").
    fn name(&self) -> &str;

    /// The capability kind, keying permission and resource-limit policy.
    fn kind(&self) -> ToolKind;

    /// Permission level an identity must hold for this adapter.
    fn required_level(&self) -> PermissionLevel {
        PermissionLevel::Execute
    }

    /// Structural parameter check. Runs before the permission gate;
    /// rejections surface as validation or security errors and are
    /// audit-logged either way.
    fn validate(&self, params: &serde_json::Value) -> Result<()>;

    /// Execute inside the given sandbox session. Long-running adapters
    /// should buffer progress via `session.buffer_partial` so a timeout
    /// can surface partial output.
    async fn execute(
        &self,
        params: &serde_json::Value,
        session: &SandboxSession,
    ) -> Result<serde_json::Value>;

    /// Scrub the raw result before it leaves the security gate.
    fn sanitize_output(&self, result: serde_json::Value) -> serde_json::Value {
        result
    }
}

impl std::fmt::Debug for dyn ToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAdapter")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}

pub use registry::ToolRegistry;
