//! Events and priority tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ValidationError;

/// Classification of an event entering the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A message from the user. Always delivered first.
    UserMessage,
    /// A tool invocation was requested.
    ToolAction,
    /// A tool invocation finished and produced a result.
    ExecutionResult,
    /// The plan for a task changed.
    PlanUpdate,
    /// Periodic component health/status report.
    SystemStatus,
    /// An error surfaced outside normal operation flow.
    Error,
}

impl EventKind {
    /// Parse the wire name of an event kind.
    pub fn parse(kind: &str) -> Result<Self, ValidationError> {
        match kind {
            "user_message" => Ok(EventKind::UserMessage),
            "tool_action" => Ok(EventKind::ToolAction),
            "execution_result" => Ok(EventKind::ExecutionResult),
            "plan_update" => Ok(EventKind::PlanUpdate),
            "system_status" => Ok(EventKind::SystemStatus),
            "error" => Ok(EventKind::Error),
            other => Err(ValidationError::UnknownEventKind {
                kind: other.to_string(),
            }),
        }
    }

    /// The delivery tier this kind belongs to. User messages are pinned to
    /// the highest tier; plan bookkeeping is background work.
    pub fn tier(&self) -> PriorityTier {
        match self {
            EventKind::UserMessage => PriorityTier::UserMessage,
            EventKind::ToolAction | EventKind::ExecutionResult => PriorityTier::ExecutionResult,
            EventKind::SystemStatus | EventKind::Error => PriorityTier::SystemStatus,
            EventKind::PlanUpdate => PriorityTier::Background,
        }
    }

    /// Payload fields that must be present for this kind to be admitted.
    pub fn required_payload_fields(&self) -> &'static [&'static str] {
        match self {
            EventKind::UserMessage => &["text"],
            EventKind::ToolAction => &["tool"],
            EventKind::ExecutionResult => &["operation_id"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::UserMessage => "user_message",
            EventKind::ToolAction => "tool_action",
            EventKind::ExecutionResult => "execution_result",
            EventKind::PlanUpdate => "plan_update",
            EventKind::SystemStatus => "system_status",
            EventKind::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One of the four fixed delivery tiers. Lower values deliver first.
///
/// Within a tier, delivery order equals arrival order (admission sequence
/// number) for every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    UserMessage = 0,
    ExecutionResult = 1,
    SystemStatus = 2,
    Background = 3,
}

impl PriorityTier {
    /// All tiers, highest priority first.
    pub const ALL: [PriorityTier; 4] = [
        PriorityTier::UserMessage,
        PriorityTier::ExecutionResult,
        PriorityTier::SystemStatus,
        PriorityTier::Background,
    ];
}

impl std::fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PriorityTier::UserMessage => "user_message",
            PriorityTier::ExecutionResult => "execution_result",
            PriorityTier::SystemStatus => "system_status",
            PriorityTier::Background => "background",
        };
        write!(f, "{s}")
    }
}

/// A single event in the stream. Consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEvent {
    /// Unique identifier for this event.
    pub id: Uuid,

    /// Event classification.
    pub kind: EventKind,

    /// Kind-specific payload.
    pub payload: serde_json::Value,

    /// Component or user that produced the event.
    pub source: String,

    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    /// Create a new event stamped with the current time.
    pub fn new(kind: EventKind, payload: serde_json::Value, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    /// Parse an event from a raw wire value, checking the fields the stream
    /// requires before admission.
    pub fn from_wire(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let kind_str = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingEventField {
                field: "type".to_string(),
            })?;
        let kind = EventKind::parse(kind_str)?;

        let timestamp = value
            .get("timestamp")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ValidationError::MissingEventField {
                field: "timestamp".to_string(),
            })?
            .parse::<DateTime<Utc>>()
            .map_err(|_| ValidationError::MissingEventField {
                field: "timestamp".to_string(),
            })?;

        let source = value
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let event = Self {
            id: value
                .get("id")
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(Uuid::new_v4),
            kind,
            payload: value.get("data").cloned().unwrap_or(serde_json::Value::Null),
            source,
            timestamp,
        };
        event.validate()?;
        Ok(event)
    }

    /// Check event shape: non-empty source and the payload fields required
    /// by the kind.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source.is_empty() {
            return Err(ValidationError::EmptySource);
        }
        for field in self.kind.required_payload_fields() {
            let present = self
                .payload
                .get(field)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !present {
                return Err(ValidationError::MissingPayloadField {
                    kind: self.kind.to_string(),
                    field: (*field).to_string(),
                });
            }
        }
        Ok(())
    }

    /// The delivery tier, derived from the kind.
    pub fn tier(&self) -> PriorityTier {
        self.kind.tier()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tiers_order_user_messages_first() {
        assert!(PriorityTier::UserMessage < PriorityTier::ExecutionResult);
        assert!(PriorityTier::ExecutionResult < PriorityTier::SystemStatus);
        assert!(PriorityTier::SystemStatus < PriorityTier::Background);
    }

    #[test]
    fn user_message_is_highest_tier() {
        let event = AgentEvent::new(
            EventKind::UserMessage,
            json!({"text": "list files"}),
            "user",
        );
        assert_eq!(event.tier(), PriorityTier::UserMessage);
    }

    #[test]
    fn validate_rejects_empty_source() {
        let event = AgentEvent::new(EventKind::SystemStatus, json!({}), "");
        assert!(matches!(
            event.validate(),
            Err(ValidationError::EmptySource)
        ));
    }

    #[test]
    fn validate_rejects_missing_required_payload_field() {
        let event = AgentEvent::new(EventKind::UserMessage, json!({}), "user");
        assert!(matches!(
            event.validate(),
            Err(ValidationError::MissingPayloadField { .. })
        ));
    }

    #[test]
    fn from_wire_rejects_missing_type() {
        let err = AgentEvent::from_wire(&json!({"timestamp": "2026-01-01T00:00:00Z"})).unwrap_err();
        assert!(matches!(err, ValidationError::MissingEventField { field } if field == "type"));
    }

    #[test]
    fn from_wire_rejects_missing_timestamp() {
        let err = AgentEvent::from_wire(&json!({
            "type": "system_status",
            "source": "monitor",
            "data": {}
        }))
        .unwrap_err();
        assert!(
            matches!(err, ValidationError::MissingEventField { field } if field == "timestamp")
        );
    }

    #[test]
    fn from_wire_rejects_unknown_kind() {
        let err = AgentEvent::from_wire(&json!({
            "type": "telepathy",
            "source": "user",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": {}
        }))
        .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownEventKind { .. }));
    }

    #[test]
    fn from_wire_accepts_well_formed_event() {
        let event = AgentEvent::from_wire(&json!({
            "type": "user_message",
            "source": "alice",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": {"text": "hello"}
        }))
        .unwrap();
        assert_eq!(event.kind, EventKind::UserMessage);
        assert_eq!(event.source, "alice");
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = AgentEvent::new(
            EventKind::ExecutionResult,
            json!({"operation_id": "op-1", "output": "ok"}),
            "security_manager",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
