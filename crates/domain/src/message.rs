//! The persisted conversational message record.
//!
//! Messages are immutable and append-only. They form a forest via
//! `parent_id` and link to tool activity through `tool_calls` (assistant
//! side) and `tool_call_id` (tool side).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation recorded on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One typed part of a multi-part message body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(rename = "file")]
    File { path: String },
    #[serde(rename = "image")]
    Image { url: String },
}

/// A persisted message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub role: Role,
    /// Role within the team (e.g. `"engineer"`); `None` for user messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_parts: Option<Vec<ContentPart>>,
    /// For role=tool: the originating assistant tool_call id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For role=assistant: the tool calls this message requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Fractional seconds since the Unix epoch.
    pub ts: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl StoredMessage {
    fn base(session_id: impl Into<String>, role: Role, content: impl Into<String>, ts: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            parent_id: None,
            role,
            agent_name: None,
            content: content.into(),
            content_parts: None,
            tool_call_id: None,
            tool_calls: Vec::new(),
            trace_id: None,
            ts,
            metadata: None,
        }
    }

    pub fn user(session_id: impl Into<String>, content: impl Into<String>, ts: f64) -> Self {
        Self::base(session_id, Role::User, content, ts)
    }

    pub fn assistant(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        content: impl Into<String>,
        ts: f64,
    ) -> Self {
        let mut msg = Self::base(session_id, Role::Assistant, content, ts);
        msg.agent_name = Some(agent_name.into());
        msg
    }

    pub fn tool(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        ts: f64,
    ) -> Self {
        let mut msg = Self::base(session_id, Role::Tool, content, ts);
        msg.agent_name = Some(agent_name.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = parent_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
    }

    #[test]
    fn tool_message_links_call_id() {
        let msg = StoredMessage::tool("s1", "engineer", "tc_1", "ok", 1.0);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("tc_1"));
        assert_eq!(msg.agent_name.as_deref(), Some("engineer"));
    }

    #[test]
    fn assistant_message_carries_tool_calls() {
        let msg = StoredMessage::assistant("s1", "engineer", "", 1.0).with_tool_calls(vec![
            ToolCall {
                id: "tc_1".into(),
                name: "write_file".into(),
                arguments: serde_json::json!({ "path": "a.txt" }),
            },
        ]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: StoredMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tool_calls.len(), 1);
        assert_eq!(back.tool_calls[0].name, "write_file");
    }

    #[test]
    fn empty_tool_calls_omitted_from_wire() {
        let msg = StoredMessage::user("s1", "hello", 1.0);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
    }

    #[test]
    fn content_part_tagging() {
        let part = ContentPart::ToolResult {
            tool_call_id: "tc_9".into(),
            content: "done".into(),
            is_error: false,
        };
        let json = serde_json::to_string(&part).unwrap();
        assert!(json.contains("\"type\":\"tool_result\""));
    }
}
