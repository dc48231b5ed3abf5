//! OpenAI-compatible adapter.
//!
//! Works with any endpoint that follows the chat-completions contract.
//! Streaming chunks carry the completion id; it is forwarded as the
//! `message_id` on token and tool-call events so the runtime can detect
//! message boundaries.

use std::time::Duration;

use serde_json::Value;

use mgx_domain::config::ProviderConfig;
use mgx_domain::{BoxStream, ChatContent, ChatMessage, ChatPart, Error, Result, Role, StreamEvent, ToolCall, ToolDefinition, Usage};

use crate::from_reqwest;
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build from config. The API key is read once from the environment
    /// variable named in the config; a missing variable leaves the provider
    /// unauthenticated (local endpoints accept that).
    pub fn from_config(id: &str, cfg: &ProviderConfig, request_timeout: Duration) -> Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| Error::Config(format!("provider '{id}': base_url is required")))?;

        let api_key = cfg
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty());

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| from_reqwest(id, e))?;

        Ok(Self {
            id: id.to_owned(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            default_model: cfg.model.clone().unwrap_or_else(|| "gpt-4o".into()),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .post(url)
            .header("Content-Type", "application/json");
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });
        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &ChatMessage) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.text(),
        }),
    }
}

fn assistant_to_openai(msg: &ChatMessage) -> Value {
    let mut obj = serde_json::json!({ "role": "assistant" });
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        ChatContent::Text(t) => text_parts.push(t.clone()),
        ChatContent::Parts(parts) => {
            for part in parts {
                match part {
                    ChatPart::Text { text } => text_parts.push(text.clone()),
                    ChatPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ChatPart::ToolResult { .. } => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &ChatMessage) -> Value {
    if let ChatContent::Parts(parts) = &msg.content {
        for part in parts {
            if let ChatPart::ToolResult {
                tool_call_id,
                content,
                ..
            } = part
            {
                return serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": content,
                });
            }
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.text(),
    })
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn provider_err(id: &str, message: impl Into<String>) -> Error {
    Error::Model {
        provider: id.to_owned(),
        message: message.into(),
    }
}

fn parse_chat_response(id: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| provider_err(id, "no choices in response"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| provider_err(id, "no message in choice"))?;

    Ok(ChatResponse {
        content: message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string(),
        tool_calls: parse_tool_calls(message),
        usage: body.get("usage").and_then(parse_usage),
        model: body
            .get("model")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn parse_tool_calls(message: &Value) -> Vec<ToolCall> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Vec::new(),
    };
    arr.iter()
        .filter_map(|tc| {
            let id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
            let arguments: Value =
                serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            Some(ToolCall {
                id,
                name,
                arguments,
            })
        })
        .collect()
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE chunk parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_sse_data(data: &str) -> Vec<Result<StreamEvent>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(StreamEvent::Done {
            usage: None,
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::Json(e))],
    };

    // The completion id is constant within one model response; the runtime
    // uses changes as the message boundary signal.
    let message_id = v.get("id").and_then(|i| i.as_str()).map(String::from);

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    // Usage-only chunk (stream_options.include_usage).
    let choice = match choice {
        Some(c) => c,
        None => {
            if let Some(usage) = v.get("usage").and_then(parse_usage) {
                return vec![Ok(StreamEvent::Done {
                    usage: Some(usage),
                    finish_reason: None,
                })];
            }
            return Vec::new();
        }
    };

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        return vec![Ok(StreamEvent::Done {
            usage: v.get("usage").and_then(parse_usage),
            finish_reason: Some(fr.to_string()),
        })];
    }

    let delta = choice.get("delta").unwrap_or(&Value::Null);
    let mut events = Vec::new();

    if let Some(tc_arr) = delta.get("tool_calls").and_then(|t| t.as_array()) {
        for tc in tc_arr {
            let index = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;

            if let Some(id) = tc.get("id").and_then(|i| i.as_str()) {
                let name = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .unwrap_or("");
                events.push(Ok(StreamEvent::ToolCallStarted {
                    index,
                    call_id: id.to_string(),
                    tool_name: name.to_string(),
                    message_id: message_id.clone(),
                }));
            }

            if let Some(args) = tc
                .get("function")
                .and_then(|f| f.get("arguments"))
                .and_then(|a| a.as_str())
            {
                if !args.is_empty() {
                    events.push(Ok(StreamEvent::ToolCallDelta {
                        index,
                        call_id: tc
                            .get("id")
                            .and_then(|i| i.as_str())
                            .unwrap_or("")
                            .to_string(),
                        delta: args.to_string(),
                    }));
                }
            }
        }
        if !events.is_empty() {
            return events;
        }
    }

    if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            events.push(Ok(StreamEvent::Token {
                text: text.to_string(),
                message_id,
            }));
        }
    }

    events
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, false);

        tracing::debug!(provider = %self.id, url = %url, "chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(&self.id, e))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| from_reqwest(&self.id, e))?;
        if !status.is_success() {
            return Err(provider_err(
                &self.id,
                format!("HTTP {} - {}", status.as_u16(), text),
            ));
        }

        let json: Value = serde_json::from_str(&text)?;
        parse_chat_response(&self.id, &json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req, true);

        tracing::debug!(provider = %self.id, url = %url, "stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(&self.id, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(|e| from_reqwest(&self.id, e))?;
            return Err(provider_err(
                &self.id,
                format!("HTTP {} - {}", status.as_u16(), text),
            ));
        }

        Ok(crate::sse::sse_response_stream(
            self.id.clone(),
            resp,
            parse_sse_data,
        ))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_chunk_carries_message_id() {
        let data = r#"{"id":"cmpl-1","choices":[{"delta":{"content":"hi"}}]}"#;
        let events = parse_sse_data(data);
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Token { text, message_id } => {
                assert_eq!(text, "hi");
                assert_eq!(message_id.as_deref(), Some("cmpl-1"));
            }
            other => panic!("expected Token, got {other:?}"),
        }
    }

    #[test]
    fn parse_tool_call_start_and_delta() {
        let data = r#"{"id":"cmpl-1","choices":[{"delta":{"tool_calls":[
            {"index":0,"id":"tc_1","function":{"name":"write_file","arguments":"{\"pa"}}
        ]}}]}"#;
        let events = parse_sse_data(data);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::ToolCallStarted { index: 0, call_id, tool_name, .. }
                if call_id == "tc_1" && tool_name == "write_file"
        ));
        assert!(matches!(
            events[1].as_ref().unwrap(),
            StreamEvent::ToolCallDelta { index: 0, delta, .. } if delta == "{\"pa"
        ));
    }

    #[test]
    fn parse_done_sentinel() {
        let events = parse_sse_data("[DONE]");
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done { .. }
        ));
    }

    #[test]
    fn parse_usage_only_chunk() {
        let data = r#"{"id":"cmpl-1","choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let events = parse_sse_data(data);
        match events[0].as_ref().unwrap() {
            StreamEvent::Done { usage: Some(u), .. } => assert_eq!(u.total_tokens, 15),
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[test]
    fn assistant_with_tools_serializes_openai_shape() {
        let msg = ChatMessage::assistant_with_tools(
            "thinking",
            &[ToolCall {
                id: "tc_1".into(),
                name: "grep_files".into(),
                arguments: serde_json::json!({ "pattern": "todo" }),
            }],
        );
        let v = msg_to_openai(&msg);
        assert_eq!(v["role"], "assistant");
        assert_eq!(v["content"], "thinking");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "grep_files");
    }

    #[test]
    fn tool_result_serializes_with_call_id() {
        let msg = ChatMessage::tool_result("tc_9", "done", false);
        let v = msg_to_openai(&msg);
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "tc_9");
        assert_eq!(v["content"], "done");
    }

    #[test]
    fn parse_full_response_with_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "tc_1",
                        "function": { "name": "run_command", "arguments": "{\"command\":\"ls\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3 }
        });
        let resp = parse_chat_response("p", &body).unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments["command"], "ls");
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
    }
}
