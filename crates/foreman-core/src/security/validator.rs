//! Permission validation — the role/permission half of the security gate.
//!
//! Evaluation is fail-closed: an unknown role, an unmapped resource, or an
//! empty table all produce a deny verdict. The policy table is built once
//! at startup and read-only thereafter, so concurrent reads need no
//! synchronization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::operation::{SecurityDecision, Verdict};
use crate::tools::ToolKind;

/// Ordered permission levels. A grant at level L satisfies any requirement
/// at level <= L.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    None = 0,
    Read = 1,
    Write = 2,
    Execute = 3,
    Admin = 4,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionLevel::None => "none",
            PermissionLevel::Read => "read",
            PermissionLevel::Write => "write",
            PermissionLevel::Execute => "execute",
            PermissionLevel::Admin => "admin",
        };
        write!(f, "{s}")
    }
}

/// Identity under which an operation is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityContext {
    /// Role looked up in the policy table.
    pub role: String,
    /// Who initiated the task (user id or component name).
    pub initiator: String,
}

impl SecurityContext {
    pub fn new(role: impl Into<String>, initiator: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            initiator: initiator.into(),
        }
    }
}

/// Role -> tool-kind -> permission-level table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyTable {
    roles: HashMap<String, HashMap<ToolKind, PermissionLevel>>,
}

impl PolicyTable {
    /// An empty table: everything denied.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Grant `role` the given level on `kind` (builder pattern).
    pub fn grant(mut self, role: &str, kind: ToolKind, level: PermissionLevel) -> Self {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(kind, level);
        self
    }

    /// The standard agent-mode policy.
    ///
    /// | Role     | Message | File    | Knowledge | Shell   |
    /// |----------|---------|---------|-----------|---------|
    /// | operator | Admin   | Admin   | Admin     | Admin   |
    /// | agent    | Execute | Execute | Execute   | Execute |
    /// | observer | Read    | Read    | Read      | —       |
    pub fn standard_agent() -> Self {
        let mut table = Self::empty();
        for kind in ToolKind::ALL {
            table = table.grant("operator", kind, PermissionLevel::Admin);
            table = table.grant("agent", kind, PermissionLevel::Execute);
        }
        for kind in [ToolKind::Message, ToolKind::File, ToolKind::Knowledge] {
            table = table.grant("observer", kind, PermissionLevel::Read);
        }
        table
    }

    /// Evaluate whether `role` meets `required` on `kind`.
    ///
    /// Fail-closed: unknown role, unmapped kind, or insufficient level all
    /// deny with an internal reason (never shown to the caller directly).
    pub fn evaluate(
        &self,
        role: &str,
        kind: ToolKind,
        required: PermissionLevel,
    ) -> Verdict {
        let Some(grants) = self.roles.get(role) else {
            return Verdict::Deny {
                reason: format!("unknown role: {role}"),
            };
        };
        let Some(level) = grants.get(&kind) else {
            return Verdict::Deny {
                reason: format!("role {role} has no grant for {kind}"),
            };
        };
        if *level >= required {
            Verdict::Allow
        } else {
            Verdict::Deny {
                reason: format!("role {role} holds {level} on {kind}, requires {required}"),
            }
        }
    }

    /// Evaluate and wrap the verdict into a [`SecurityDecision`] for the
    /// given operation.
    pub fn decide(
        &self,
        operation_id: Uuid,
        role: &str,
        kind: ToolKind,
        required: PermissionLevel,
    ) -> SecurityDecision {
        match self.evaluate(role, kind, required) {
            Verdict::Allow => SecurityDecision::allow(operation_id),
            Verdict::Deny { reason } => SecurityDecision::deny(operation_id, reason),
        }
    }
}
