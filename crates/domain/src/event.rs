//! The persisted event record — the finest-grained observable of a run.
//!
//! Events are append-only, totally ordered per session by `(ts, insertion)`,
//! and expire via the store's TTL policy. The `event_type` wire values are
//! fixed; legacy producers prefixed them (`EventType.LLM_STREAM`), so the
//! deserializer normalises both forms.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EventType
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Canonical event taxonomy. Wire values are the snake_case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    AgentStart,
    NodeStart,
    LlmStream,
    MessageComplete,
    ToolStart,
    ToolEnd,
    NodeEnd,
    StageChange,
    Custom,
    AgentError,
    Finish,
}

impl EventType {
    /// The canonical wire value.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventType::AgentStart => "agent_start",
            EventType::NodeStart => "node_start",
            EventType::LlmStream => "llm_stream",
            EventType::MessageComplete => "message_complete",
            EventType::ToolStart => "tool_start",
            EventType::ToolEnd => "tool_end",
            EventType::NodeEnd => "node_end",
            EventType::StageChange => "stage_change",
            EventType::Custom => "custom",
            EventType::AgentError => "agent_error",
            EventType::Finish => "finish",
        }
    }

    /// Parse a wire value, accepting both the canonical snake_case form and
    /// the legacy enum-prefixed form (`EventType.LLM_STREAM`).
    pub fn parse_wire(raw: &str) -> Option<Self> {
        let stripped = raw.strip_prefix("EventType.").unwrap_or(raw);
        let normalized = stripped.to_ascii_lowercase();
        match normalized.as_str() {
            "agent_start" => Some(EventType::AgentStart),
            "node_start" => Some(EventType::NodeStart),
            "llm_stream" => Some(EventType::LlmStream),
            "message_complete" => Some(EventType::MessageComplete),
            "tool_start" => Some(EventType::ToolStart),
            "tool_end" => Some(EventType::ToolEnd),
            "node_end" => Some(EventType::NodeEnd),
            "stage_change" => Some(EventType::StageChange),
            "custom" => Some(EventType::Custom),
            "agent_error" => Some(EventType::AgentError),
            "finish" => Some(EventType::Finish),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct WireVisitor;

        impl Visitor<'_> for WireVisitor {
            type Value = EventType;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("an event type wire value")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<EventType, E> {
                EventType::parse_wire(v)
                    .ok_or_else(|| E::custom(format!("unknown event type '{v}'")))
            }
        }

        deserializer.deserialize_str(WireVisitor)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FinishStatus
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Terminal status carried by the sole `finish` event of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishStatus {
    Success,
    Failed,
    Timeout,
    Stopped,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A single persisted event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub session_id: String,
    /// Fractional seconds since the Unix epoch; non-decreasing per producer.
    pub ts: f64,
    pub event_type: EventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Subgraph node path; empty for the root graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespace: Vec<String>,
    /// Type-dependent payload (see the runtime's emission table).
    pub data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Event {
    /// Construct an event with a fresh id and the given timestamp.
    pub fn new(session_id: impl Into<String>, ts: f64, event_type: EventType, data: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            ts,
            event_type,
            agent_name: None,
            namespace: Vec::new(),
            data,
            message_id: None,
            trace_id: None,
            metadata: None,
        }
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_namespace(mut self, namespace: Vec<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_trace_id(mut self, trace_id: Option<String>) -> Self {
        self.trace_id = trace_id;
        self
    }

    /// For `finish` events: the terminal status carried in `data.status`.
    pub fn finish_status(&self) -> Option<FinishStatus> {
        if self.event_type != EventType::Finish {
            return None;
        }
        self.data
            .get("status")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_snake_case() {
        assert_eq!(EventType::LlmStream.as_wire(), "llm_stream");
        assert_eq!(EventType::MessageComplete.as_wire(), "message_complete");
        assert_eq!(
            serde_json::to_string(&EventType::AgentStart).unwrap(),
            "\"agent_start\""
        );
    }

    #[test]
    fn parse_accepts_canonical_form() {
        assert_eq!(EventType::parse_wire("finish"), Some(EventType::Finish));
        assert_eq!(EventType::parse_wire("tool_end"), Some(EventType::ToolEnd));
    }

    #[test]
    fn parse_normalizes_legacy_prefixed_form() {
        assert_eq!(
            EventType::parse_wire("EventType.LLM_STREAM"),
            Some(EventType::LlmStream)
        );
        assert_eq!(
            EventType::parse_wire("EventType.STAGE_CHANGE"),
            Some(EventType::StageChange)
        );
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(EventType::parse_wire("token"), None);
        assert_eq!(EventType::parse_wire(""), None);
    }

    #[test]
    fn deserialize_legacy_value() {
        let et: EventType = serde_json::from_str("\"EventType.FINISH\"").unwrap();
        assert_eq!(et, EventType::Finish);
    }

    #[test]
    fn finish_status_extraction() {
        let ev = Event::new(
            "s1",
            1.0,
            EventType::Finish,
            serde_json::json!({ "status": "timeout", "reason": "wall clock" }),
        );
        assert_eq!(ev.finish_status(), Some(FinishStatus::Timeout));
    }

    #[test]
    fn finish_status_none_for_other_types() {
        let ev = Event::new(
            "s1",
            1.0,
            EventType::NodeStart,
            serde_json::json!({ "status": "success" }),
        );
        assert_eq!(ev.finish_status(), None);
    }

    #[test]
    fn event_roundtrip_preserves_namespace() {
        let ev = Event::new("s1", 2.5, EventType::NodeStart, serde_json::json!({}))
            .with_namespace(vec!["team".into(), "engineer".into()])
            .with_agent("engineer");
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.namespace, vec!["team", "engineer"]);
        assert_eq!(back.agent_name.as_deref(), Some("engineer"));
    }
}
