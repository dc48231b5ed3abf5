use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events emitted during LLM streaming (provider-agnostic).
///
/// `message_id` is the upstream chunk id when the provider supplies one;
/// the runtime closes the current assistant message and opens a new one
/// whenever it changes mid-stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text token chunk.
    #[serde(rename = "token")]
    Token {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// A tool call has started streaming at the given index.
    #[serde(rename = "tool_call_started")]
    ToolCallStarted {
        index: usize,
        call_id: String,
        tool_name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Incremental tool-call argument JSON.
    #[serde(rename = "tool_call_delta")]
    ToolCallDelta {
        index: usize,
        call_id: String,
        delta: String,
    },

    /// A tool call is complete with fully-assembled arguments.
    #[serde(rename = "tool_call_finished")]
    ToolCallFinished {
        index: usize,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    /// Stream is finished.
    #[serde(rename = "done")]
    Done {
        usage: Option<Usage>,
        finish_reason: Option<String>,
    },

    /// An error occurred during streaming.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
