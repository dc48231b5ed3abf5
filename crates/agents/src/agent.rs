//! The agent tool loop.
//!
//! One [`Agent::invoke`] call runs the iterative model/tool cycle for a
//! single graph node: apply middleware, stream the model, assemble tool
//! calls from incremental fragments, dispatch tools, and repeat until the
//! model produces a final message, records a workflow decision, or the
//! iteration cap is hit. Everything observable is forwarded as
//! [`AgentEvent`]s; the caller owns persistence.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use mgx_domain::{ChatMessage, Decision, Error, Result, StreamEvent, ToolCall, Usage};
use mgx_providers::{ChatRequest, LlmProvider};
use mgx_tools::{decision_from_args, ToolRegistry, DECISION_TOOL_NAME};

use crate::middleware::Middleware;
use crate::roles::AgentSpec;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What kind of content an LLM delta carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmContentType {
    Text,
    ToolCall,
}

/// Events emitted during one agent invocation, in order.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// An incremental LLM chunk (text or tool-call argument fragment).
    LlmDelta {
        message_id: String,
        delta: String,
        content_type: LlmContentType,
        tool_call_index: Option<usize>,
        tool_call_name: Option<String>,
        tool_call_id: Option<String>,
    },
    /// The assistant message for one model turn is complete.
    AssistantComplete {
        message_id: String,
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolStart {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolEnd {
        tool_call_id: String,
        tool_name: String,
        result: String,
        error: bool,
    },
    /// A tool-role message carrying the result, linked to its call.
    ToolMessage {
        message_id: String,
        tool_call_id: String,
        content: String,
        error: bool,
    },
}

/// Result of a full invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Text of the last assistant turn.
    pub final_text: String,
    /// Decision recorded via the workflow-decision tool, if any.
    pub decision: Option<Decision>,
    /// Messages produced during the loop (assistant + tool), in order.
    pub appended: Vec<ChatMessage>,
    pub usage: Usage,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Agent {
    spec: AgentSpec,
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    retry: RetryPolicy,
}

/// In-flight assembly of one streamed tool call.
#[derive(Default)]
struct ToolCallBuf {
    call_id: String,
    name: String,
    args_json: String,
    finished: Option<ToolCall>,
}

impl Agent {
    pub fn new(
        spec: AgentSpec,
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            spec,
            provider,
            tools,
            middleware,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Open the model stream, retrying transient failures with bounded
    /// exponential back-off.
    async fn open_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<mgx_domain::BoxStream<'static, Result<StreamEvent>>> {
        let mut attempt: u32 = 0;
        loop {
            match self.provider.chat_stream(req).await {
                Ok(stream) => return Ok(stream),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.attempts => {
                    attempt += 1;
                    let delay = self.retry.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::warn!(
                        agent = %self.spec.name,
                        attempt,
                        error = %e,
                        "model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run the model/tool loop over `history`, emitting events to `tx`.
    ///
    /// `history` is the shared conversation (without this agent's system
    /// prompt); the returned [`AgentOutcome::appended`] carries the
    /// messages this invocation added.
    pub async fn invoke(
        &self,
        history: &[ChatMessage],
        tx: &mpsc::Sender<AgentEvent>,
    ) -> Result<AgentOutcome> {
        let mut messages: Vec<ChatMessage> = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.spec.system_prompt.clone()));
        messages.extend_from_slice(history);

        let mut appended: Vec<ChatMessage> = Vec::new();
        let mut decision: Option<Decision> = None;
        let mut total_usage = Usage {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        };
        let mut final_text = String::new();

        for loop_idx in 0..self.spec.max_tool_loops {
            tracing::debug!(agent = %self.spec.name, loop_idx, "tool loop iteration");

            // Pre-model middleware (context compression et al.).
            let mut model_messages = messages.clone();
            for mw in &self.middleware {
                model_messages = mw.before_model(model_messages).await;
            }

            let req = ChatRequest {
                messages: model_messages,
                tools: self.tools.definitions(),
                temperature: Some(0.2),
                max_tokens: None,
                model: None,
            };

            let mut stream = self.open_stream(&req).await?;

            // ── Accumulate one model turn ─────────────────────────
            let mut message_id: Option<String> = None;
            let mut text_buf = String::new();
            let mut tc_bufs: Vec<ToolCallBuf> = Vec::new();
            let mut turn_usage: Option<Usage> = None;

            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::Token { text, message_id: chunk_id } => {
                        // Upstream chunk-id change closes the current
                        // message and opens a new one.
                        if let (Some(current), Some(incoming)) = (&message_id, &chunk_id) {
                            if current != incoming {
                                let closed = self
                                    .close_assistant_turn(
                                        current.clone(),
                                        std::mem::take(&mut text_buf),
                                        std::mem::take(&mut tc_bufs),
                                        tx,
                                    )
                                    .await;
                                messages.push(closed.clone());
                                appended.push(closed);
                                message_id = None;
                            }
                        }
                        let id = message_id
                            .get_or_insert_with(|| {
                                chunk_id.unwrap_or_else(new_message_id)
                            })
                            .clone();
                        text_buf.push_str(&text);
                        let _ = tx
                            .send(AgentEvent::LlmDelta {
                                message_id: id,
                                delta: text,
                                content_type: LlmContentType::Text,
                                tool_call_index: None,
                                tool_call_name: None,
                                tool_call_id: None,
                            })
                            .await;
                    }
                    StreamEvent::ToolCallStarted {
                        index,
                        call_id,
                        tool_name,
                        message_id: chunk_id,
                    } => {
                        let id = message_id
                            .get_or_insert_with(|| chunk_id.unwrap_or_else(new_message_id))
                            .clone();
                        if tc_bufs.len() <= index {
                            tc_bufs.resize_with(index + 1, ToolCallBuf::default);
                        }
                        tc_bufs[index].call_id = call_id.clone();
                        tc_bufs[index].name = tool_name.clone();
                        let _ = tx
                            .send(AgentEvent::LlmDelta {
                                message_id: id,
                                delta: String::new(),
                                content_type: LlmContentType::ToolCall,
                                tool_call_index: Some(index),
                                tool_call_name: Some(tool_name),
                                tool_call_id: Some(call_id),
                            })
                            .await;
                    }
                    StreamEvent::ToolCallDelta { index, call_id, delta } => {
                        let id = message_id.get_or_insert_with(new_message_id).clone();
                        if tc_bufs.len() <= index {
                            tc_bufs.resize_with(index + 1, ToolCallBuf::default);
                        }
                        if tc_bufs[index].call_id.is_empty() && !call_id.is_empty() {
                            tc_bufs[index].call_id = call_id;
                        }
                        tc_bufs[index].args_json.push_str(&delta);
                        let buf = &tc_bufs[index];
                        let _ = tx
                            .send(AgentEvent::LlmDelta {
                                message_id: id,
                                delta,
                                content_type: LlmContentType::ToolCall,
                                tool_call_index: Some(index),
                                tool_call_name: if buf.name.is_empty() {
                                    None
                                } else {
                                    Some(buf.name.clone())
                                },
                                tool_call_id: if buf.call_id.is_empty() {
                                    None
                                } else {
                                    Some(buf.call_id.clone())
                                },
                            })
                            .await;
                    }
                    StreamEvent::ToolCallFinished {
                        index,
                        call_id,
                        tool_name,
                        arguments,
                    } => {
                        if tc_bufs.len() <= index {
                            tc_bufs.resize_with(index + 1, ToolCallBuf::default);
                        }
                        tc_bufs[index].finished = Some(ToolCall {
                            id: call_id,
                            name: tool_name,
                            arguments,
                        });
                    }
                    StreamEvent::Done { usage, .. } => {
                        turn_usage = usage;
                    }
                    StreamEvent::Error { message } => {
                        return Err(Error::Model {
                            provider: self.provider.provider_id().to_owned(),
                            message,
                        });
                    }
                }
            }

            if let Some(u) = &turn_usage {
                total_usage.prompt_tokens += u.prompt_tokens;
                total_usage.completion_tokens += u.completion_tokens;
                total_usage.total_tokens += u.total_tokens;
            }

            // ── Close the turn ────────────────────────────────────
            let turn_id = message_id.unwrap_or_else(new_message_id);
            let assistant = self
                .close_assistant_turn(turn_id, text_buf, tc_bufs, tx)
                .await;
            let tool_calls = assistant.tool_calls();
            final_text = assistant.content.text();
            messages.push(assistant.clone());
            appended.push(assistant);

            // Final answer: no tool calls requested.
            if tool_calls.is_empty() {
                return Ok(AgentOutcome {
                    final_text,
                    decision,
                    appended,
                    usage: total_usage,
                });
            }

            // ── Tool dispatch, in call order ──────────────────────
            let mut decided_this_turn = false;
            for tc in &tool_calls {
                if tc.name == DECISION_TOOL_NAME {
                    if let Some(d) = decision_from_args(&tc.arguments) {
                        decision = Some(d);
                        decided_this_turn = true;
                    }
                }

                let _ = tx
                    .send(AgentEvent::ToolStart {
                        tool_call_id: tc.id.clone(),
                        tool_name: tc.name.clone(),
                        args: tc.arguments.clone(),
                    })
                    .await;

                let outcome = self.tools.dispatch(&tc.name, tc.arguments.clone()).await;

                let _ = tx
                    .send(AgentEvent::ToolEnd {
                        tool_call_id: tc.id.clone(),
                        tool_name: tc.name.clone(),
                        result: outcome.content.clone(),
                        error: outcome.is_error,
                    })
                    .await;

                let tool_msg = ChatMessage::tool_result(
                    tc.id.clone(),
                    outcome.content.clone(),
                    outcome.is_error,
                );
                messages.push(tool_msg.clone());
                appended.push(tool_msg);

                let _ = tx
                    .send(AgentEvent::ToolMessage {
                        message_id: new_message_id(),
                        tool_call_id: tc.id.clone(),
                        content: outcome.content,
                        error: outcome.is_error,
                    })
                    .await;
            }

            // The decision sentinel ends the turn — the agent has chosen
            // its next action, there is nothing left to ask the model.
            if decided_this_turn {
                return Ok(AgentOutcome {
                    final_text,
                    decision,
                    appended,
                    usage: total_usage,
                });
            }

            if loop_idx == self.spec.max_tool_loops - 1 {
                tracing::warn!(
                    agent = %self.spec.name,
                    cap = self.spec.max_tool_loops,
                    "tool loop cap reached"
                );
            }
        }

        Ok(AgentOutcome {
            final_text,
            decision,
            appended,
            usage: total_usage,
        })
    }

    /// Emit `AssistantComplete` for one model turn and build the message.
    async fn close_assistant_turn(
        &self,
        message_id: String,
        text: String,
        tc_bufs: Vec<ToolCallBuf>,
        tx: &mpsc::Sender<AgentEvent>,
    ) -> ChatMessage {
        let tool_calls: Vec<ToolCall> = tc_bufs
            .into_iter()
            .filter(|b| b.finished.is_some() || !b.call_id.is_empty() || !b.name.is_empty())
            .map(|b| match b.finished {
                Some(tc) => tc,
                None => {
                    let arguments = if b.args_json.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&b.args_json).unwrap_or_else(|e| {
                            tracing::warn!(
                                call_id = %b.call_id,
                                tool = %b.name,
                                error = %e,
                                "tool call arguments are not valid JSON; using empty object"
                            );
                            Value::Object(Default::default())
                        })
                    };
                    ToolCall {
                        id: b.call_id,
                        name: b.name,
                        arguments,
                    }
                }
            })
            .collect();

        let _ = tx
            .send(AgentEvent::AssistantComplete {
                message_id,
                content: text.clone(),
                tool_calls: tool_calls.clone(),
            })
            .await;

        if tool_calls.is_empty() {
            ChatMessage::assistant(text)
        } else {
            ChatMessage::assistant_with_tools(&text, &tool_calls)
        }
    }
}

fn new_message_id() -> String {
    format!("msg-{}", uuid::Uuid::new_v4().as_simple())
}
