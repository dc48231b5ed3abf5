//! Provider-agnostic chat types.
//!
//! Every LLM adapter converts between these and its wire format. The
//! persisted [`StoredMessage`](crate::message::StoredMessage) is the durable
//! record; `ChatMessage` is the in-flight shape handed to models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{ContentPart, Role, StoredMessage, ToolCall};

/// Chat role, identical wire values to the persisted [`Role`].
pub type ChatRole = Role;

/// Tool definition exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

/// A message in the model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

// ── Convenience constructors ───────────────────────────────────────

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: ChatContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: ChatContent::Text(text.into()),
        }
    }

    /// An assistant message carrying text plus tool-use parts.
    pub fn assistant_with_tools(text: &str, tool_calls: &[ToolCall]) -> Self {
        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(ChatPart::Text { text: text.to_owned() });
        }
        for tc in tool_calls {
            parts.push(ChatPart::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.arguments.clone(),
            });
        }
        Self {
            role: Role::Assistant,
            content: ChatContent::Parts(parts),
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: ChatContent::Parts(vec![ChatPart::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
                is_error,
            }]),
        }
    }

    /// Rehydrate a chat message from a persisted record.
    ///
    /// Tool messages need a `tool_call_id`; persisted tool rows without one
    /// cannot be replayed to a model and yield `None`.
    pub fn from_stored(msg: &StoredMessage) -> Option<Self> {
        match msg.role {
            Role::Tool => {
                let id = msg.tool_call_id.as_deref()?;
                Some(Self::tool_result(id, msg.content.clone(), false))
            }
            Role::Assistant if !msg.tool_calls.is_empty() => {
                Some(Self::assistant_with_tools(&msg.content, &msg.tool_calls))
            }
            role => Some(Self {
                role,
                content: ChatContent::Text(msg.content.clone()),
            }),
        }
    }

    /// The tool calls requested by this message, if any.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        match &self.content {
            ChatContent::Text(_) => Vec::new(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ChatPart::ToolUse { id, name, input } => Some(ToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: input.clone(),
                    }),
                    _ => None,
                })
                .collect(),
        }
    }
}

impl ChatContent {
    /// Join all text content into an owned string; non-text parts are skipped.
    pub fn text(&self) -> String {
        match self {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ChatPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Convert persisted content parts into chat parts for model replay.
pub fn chat_parts_from_content(parts: &[ContentPart]) -> Vec<ChatPart> {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(ChatPart::Text { text: text.clone() }),
            ContentPart::ToolCall { id, name, arguments } => Some(ChatPart::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: arguments.clone(),
            }),
            ContentPart::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => Some(ChatPart::ToolResult {
                tool_call_id: tool_call_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            }),
            ContentPart::File { .. } | ContentPart::Image { .. } => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_join_skips_tool_parts() {
        let content = ChatContent::Parts(vec![
            ChatPart::Text { text: "one".into() },
            ChatPart::ToolUse {
                id: "c1".into(),
                name: "exec".into(),
                input: serde_json::json!({}),
            },
            ChatPart::Text { text: "two".into() },
        ]);
        assert_eq!(content.text(), "one\ntwo");
    }

    #[test]
    fn from_stored_tool_without_call_id_is_dropped() {
        let mut msg = StoredMessage::tool("s1", "qa", "tc", "result", 1.0);
        msg.tool_call_id = None;
        assert!(ChatMessage::from_stored(&msg).is_none());
    }

    #[test]
    fn from_stored_assistant_with_tools() {
        let stored = StoredMessage::assistant("s1", "engineer", "writing", 1.0).with_tool_calls(
            vec![ToolCall {
                id: "tc_1".into(),
                name: "write_file".into(),
                arguments: serde_json::json!({ "path": "a.txt", "content": "x" }),
            }],
        );
        let chat = ChatMessage::from_stored(&stored).unwrap();
        let calls = chat.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "tc_1");
    }

    #[test]
    fn tool_calls_empty_for_plain_text() {
        assert!(ChatMessage::assistant("hi").tool_calls().is_empty());
    }
}
