//! Deterministic scripted provider.
//!
//! Replays a fixed sequence of turns, one per `chat`/`chat_stream` call, in
//! invocation order. Used by the test suites and by offline development
//! (`kind = "scripted"` in config). Each streamed turn gets a fresh
//! synthetic message id, chunked text, and incremental tool-call argument
//! fragments, so consumers exercise the same assembly paths as with a real
//! endpoint.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde_json::Value;

use mgx_domain::{BoxStream, Error, Result, StreamEvent, ToolCall, Usage};

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One scripted tool call; arguments are streamed as JSON fragments.
#[derive(Debug, Clone)]
pub struct ScriptedToolCall {
    pub name: String,
    pub arguments: Value,
}

/// One scripted model turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    /// Text chunks streamed as individual tokens.
    pub text_chunks: Vec<String>,
    /// Tool calls emitted after the text.
    pub tool_calls: Vec<ScriptedToolCall>,
}

impl ScriptedTurn {
    /// A plain text turn, split into word-ish chunks.
    pub fn text(content: &str) -> Self {
        Self {
            text_chunks: content
                .split_inclusive(' ')
                .map(|s| s.to_string())
                .collect(),
            tool_calls: Vec::new(),
        }
    }

    /// A turn that invokes one tool.
    pub fn tool(name: &str, arguments: Value) -> Self {
        Self {
            text_chunks: Vec::new(),
            tool_calls: vec![ScriptedToolCall {
                name: name.into(),
                arguments,
            }],
        }
    }

    pub fn with_text(mut self, content: &str) -> Self {
        self.text_chunks = content
            .split_inclusive(' ')
            .map(|s| s.to_string())
            .collect();
        self
    }
}

pub struct ScriptedProvider {
    id: String,
    turns: Mutex<VecDeque<ScriptedTurn>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            id: "scripted".into(),
            turns: Mutex::new(turns.into()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Remaining unplayed turns (test assertion helper).
    pub fn remaining(&self) -> usize {
        self.turns.lock().len()
    }

    fn next_turn(&self) -> Result<ScriptedTurn> {
        self.turns.lock().pop_front().ok_or_else(|| Error::Model {
            provider: self.id.clone(),
            message: "script exhausted".into(),
        })
    }

    fn usage(turn: &ScriptedTurn) -> Usage {
        let completion = turn.text_chunks.len() as u32 + turn.tool_calls.len() as u32;
        Usage {
            prompt_tokens: 8,
            completion_tokens: completion,
            total_tokens: 8 + completion,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
        let turn = self.next_turn()?;
        let tool_calls: Vec<ToolCall> = turn
            .tool_calls
            .iter()
            .map(|tc| ToolCall {
                id: format!("tc-{}", uuid::Uuid::new_v4().as_simple()),
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            })
            .collect();
        let finish_reason = if tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };
        Ok(ChatResponse {
            content: turn.text_chunks.concat(),
            usage: Some(Self::usage(&turn)),
            model: self.id.clone(),
            finish_reason: Some(finish_reason.into()),
            tool_calls,
        })
    }

    async fn chat_stream(
        &self,
        _req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let turn = self.next_turn()?;
        let message_id = format!("scripted-{}", uuid::Uuid::new_v4().as_simple());
        let usage = Self::usage(&turn);

        let stream = async_stream::stream! {
            for chunk in &turn.text_chunks {
                yield Ok(StreamEvent::Token {
                    text: chunk.clone(),
                    message_id: Some(message_id.clone()),
                });
            }

            for (index, tc) in turn.tool_calls.iter().enumerate() {
                let call_id = format!("tc-{}", uuid::Uuid::new_v4().as_simple());
                yield Ok(StreamEvent::ToolCallStarted {
                    index,
                    call_id: call_id.clone(),
                    tool_name: tc.name.clone(),
                    message_id: Some(message_id.clone()),
                });

                // Stream the arguments as two fragments to exercise
                // incremental assembly downstream.
                let args = tc.arguments.to_string();
                let mid = args.len() / 2;
                // Fragment boundaries must respect UTF-8.
                let mut split = mid;
                while !args.is_char_boundary(split) && split > 0 {
                    split -= 1;
                }
                let (head, tail) = args.split_at(split);
                for fragment in [head, tail] {
                    if !fragment.is_empty() {
                        yield Ok(StreamEvent::ToolCallDelta {
                            index,
                            call_id: call_id.clone(),
                            delta: fragment.to_string(),
                        });
                    }
                }

                yield Ok(StreamEvent::ToolCallFinished {
                    index,
                    call_id,
                    tool_name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                });
            }

            let finish_reason = if turn.tool_calls.is_empty() {
                "stop"
            } else {
                "tool_calls"
            };
            yield Ok(StreamEvent::Done {
                usage: Some(usage),
                finish_reason: Some(finish_reason.into()),
            });
        };

        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn turns_play_in_order_then_exhaust() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::text("first reply"),
            ScriptedTurn::text("second reply"),
        ]);
        let req = ChatRequest::default();
        assert_eq!(provider.chat(&req).await.unwrap().content, "first reply");
        assert_eq!(provider.chat(&req).await.unwrap().content, "second reply");
        assert!(provider.chat(&req).await.is_err());
    }

    #[tokio::test]
    async fn stream_emits_tokens_with_stable_message_id() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::text("hello streaming world")]);
        let mut stream = provider.chat_stream(&ChatRequest::default()).await.unwrap();

        let mut ids = Vec::new();
        let mut text = String::new();
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Token { text: t, message_id } => {
                    text.push_str(&t);
                    ids.push(message_id.unwrap());
                }
                StreamEvent::Done { finish_reason, .. } => {
                    assert_eq!(finish_reason.as_deref(), Some("stop"));
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(text, "hello streaming world");
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn stream_tool_call_fragments_reassemble() {
        let args = serde_json::json!({ "path": "a.txt", "content": "x" });
        let provider = ScriptedProvider::new(vec![ScriptedTurn::tool("write_file", args.clone())]);
        let mut stream = provider.chat_stream(&ChatRequest::default()).await.unwrap();

        let mut assembled = String::new();
        let mut finished_args = None;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::ToolCallStarted { tool_name, .. } => {
                    assert_eq!(tool_name, "write_file");
                }
                StreamEvent::ToolCallDelta { delta, .. } => assembled.push_str(&delta),
                StreamEvent::ToolCallFinished { arguments, .. } => {
                    finished_args = Some(arguments);
                }
                StreamEvent::Done { finish_reason, .. } => {
                    assert_eq!(finish_reason.as_deref(), Some("tool_calls"));
                }
                StreamEvent::Token { .. } => {}
                other => panic!("unexpected event {other:?}"),
            }
        }
        let parsed: Value = serde_json::from_str(&assembled).unwrap();
        assert_eq!(parsed, args);
        assert_eq!(finished_args.unwrap(), args);
    }
}
