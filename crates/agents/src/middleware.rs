//! Pre-model middleware.
//!
//! The only built-in middleware is the context compressor: when the
//! conversation exceeds its budgets, older turns are folded into a single
//! summary message so the context window stays healthy. Summarization
//! failure falls back to pass-through — content is never dropped.

use std::sync::Arc;

use mgx_domain::config::CompactionConfig;
use mgx_domain::{ChatContent, ChatMessage, ChatPart, Result, Role};
use mgx_providers::{ChatRequest, LlmProvider};

#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Transform the message list before it is handed to the model.
    async fn before_model(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context compressor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ContextCompressor {
    config: CompactionConfig,
    summarizer: Arc<dyn LlmProvider>,
}

const DEFAULT_SUMMARY_PROMPT: &str = "You are a conversation summarizer. Summarize the \
following conversation history into a concise digest that preserves:\n\
1. The current goal being worked on\n\
2. Key decisions made\n\
3. Files and documents produced so far\n\
4. Open questions or pending work\n\
Be concise but keep all actionable context. Write in present tense.";

/// Rough token estimate: four characters per token.
pub fn estimate_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|m| message_chars(m) / 4 + 4)
        .sum()
}

fn message_chars(msg: &ChatMessage) -> usize {
    match &msg.content {
        ChatContent::Text(t) => t.len(),
        ChatContent::Parts(parts) => parts
            .iter()
            .map(|p| match p {
                ChatPart::Text { text } => text.len(),
                ChatPart::ToolUse { input, .. } => input.to_string().len(),
                ChatPart::ToolResult { content, .. } => content.len(),
            })
            .sum(),
    }
}

/// Count of leading system messages (never compressed).
fn system_prefix_len(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .take_while(|m| m.role == Role::System)
        .count()
}

impl ContextCompressor {
    pub fn new(config: CompactionConfig, summarizer: Arc<dyn LlmProvider>) -> Self {
        Self { config, summarizer }
    }

    /// The index where the verbatim suffix starts.
    ///
    /// Keeps the last `keep_last` messages, then backs the cut up so it
    /// never lands between an assistant's tool_calls and their tool
    /// results: whenever the suffix would begin with a tool-role message,
    /// the cut moves back to include the owning assistant message.
    pub fn split_index(messages: &[ChatMessage], keep_last: usize) -> usize {
        let system = system_prefix_len(messages);
        let mut cut = messages.len().saturating_sub(keep_last).max(system);
        while cut > system && messages[cut].role == Role::Tool {
            cut -= 1;
        }
        cut
    }

    fn render_transcript(messages: &[ChatMessage]) -> String {
        let mut buf = String::new();
        for msg in messages {
            let label = match msg.role {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
            };
            let text = msg.content.text();
            buf.push_str(label);
            buf.push_str(": ");
            // Long tool output gets clipped; the summary does not need it.
            if text.len() > 2000 {
                buf.push_str(&text[..1000]);
                buf.push_str(" [...] ");
            } else {
                buf.push_str(&text);
            }
            buf.push('\n');
        }
        buf
    }

    async fn summarize(&self, prefix: &[ChatMessage]) -> Result<String> {
        let prompt = self
            .config
            .prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SUMMARY_PROMPT.to_owned());
        let conversation = Self::render_transcript(prefix);

        let req = ChatRequest {
            messages: vec![ChatMessage::user(format!(
                "{prompt}\n\nCONVERSATION:\n{conversation}"
            ))],
            tools: Vec::new(),
            temperature: Some(0.1),
            max_tokens: Some(2000),
            model: None,
        };
        let resp = self.summarizer.chat(&req).await?;
        Ok(resp.content)
    }
}

#[async_trait::async_trait]
impl Middleware for ContextCompressor {
    async fn before_model(&self, messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        if !self.config.enabled {
            return messages;
        }
        let over_messages = messages.len() > self.config.trigger_messages;
        let over_tokens = estimate_tokens(&messages) > self.config.trigger_tokens;
        if !over_messages && !over_tokens {
            return messages;
        }

        let system = system_prefix_len(&messages);
        let cut = Self::split_index(&messages, self.config.keep_last_messages);
        if cut <= system {
            return messages;
        }

        match self.summarize(&messages[system..cut]).await {
            Ok(digest) if !digest.is_empty() => {
                tracing::info!(
                    folded = cut - system,
                    kept = messages.len() - cut,
                    "conversation compressed"
                );
                let mut out: Vec<ChatMessage> = Vec::with_capacity(messages.len() - cut + system + 1);
                out.extend_from_slice(&messages[..system]);
                out.push(ChatMessage::user(format!(
                    "Summary of the earlier conversation:\n{digest}"
                )));
                out.extend_from_slice(&messages[cut..]);
                out
            }
            Ok(_) => messages,
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, keeping full history");
                messages
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_domain::ToolCall;
    use mgx_providers::{ScriptedProvider, ScriptedTurn};
    use serde_json::json;

    fn long_conversation(pairs: usize) -> Vec<ChatMessage> {
        let mut msgs = vec![ChatMessage::system("you are helpful")];
        for i in 0..pairs {
            msgs.push(ChatMessage::user(format!("question {i}")));
            msgs.push(ChatMessage::assistant(format!("answer {i}")));
        }
        msgs
    }

    fn compressor(trigger_messages: usize, keep_last: usize) -> ContextCompressor {
        ContextCompressor::new(
            CompactionConfig {
                enabled: true,
                trigger_tokens: usize::MAX,
                trigger_messages,
                keep_last_messages: keep_last,
                prompt: None,
            },
            Arc::new(ScriptedProvider::new(vec![ScriptedTurn::text(
                "digest of earlier turns",
            )])),
        )
    }

    #[tokio::test]
    async fn under_threshold_passes_through() {
        let msgs = long_conversation(2);
        let out = compressor(100, 4).before_model(msgs.clone()).await;
        assert_eq!(out.len(), msgs.len());
    }

    #[tokio::test]
    async fn over_threshold_folds_prefix() {
        let msgs = long_conversation(10); // 21 messages
        let out = compressor(10, 4).before_model(msgs).await;

        // system + digest + last 4 verbatim.
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[1].role, Role::User);
        assert!(out[1].content.text().contains("digest of earlier turns"));
        assert_eq!(out[2].content.text(), "question 8");
        assert_eq!(out[5].content.text(), "answer 9");
    }

    #[tokio::test]
    async fn preserved_suffix_count_is_exact() {
        let msgs = long_conversation(10);
        let keep = 6;
        let cut = ContextCompressor::split_index(&msgs, keep);
        assert_eq!(msgs.len() - cut, keep);
    }

    #[test]
    fn split_never_separates_tool_results_from_their_call() {
        let tc = ToolCall {
            id: "tc_1".into(),
            name: "write_file".into(),
            arguments: json!({}),
        };
        let msgs = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("old question"),
            ChatMessage::assistant("old answer"),
            ChatMessage::assistant_with_tools("calling", &[tc]),
            ChatMessage::tool_result("tc_1", "ok", false),
            ChatMessage::assistant("done"),
        ];
        // keep_last = 2 would naively cut at index 4 — the tool result.
        let cut = ContextCompressor::split_index(&msgs, 2);
        assert_eq!(cut, 3, "cut must back up to the assistant that owns tc_1");
        assert_eq!(msgs[cut].role, Role::Assistant);
    }

    #[test]
    fn split_handles_consecutive_tool_results() {
        let tcs = vec![
            ToolCall { id: "a".into(), name: "t".into(), arguments: json!({}) },
            ToolCall { id: "b".into(), name: "t".into(), arguments: json!({}) },
        ];
        let msgs = vec![
            ChatMessage::user("q"),
            ChatMessage::assistant_with_tools("", &tcs),
            ChatMessage::tool_result("a", "r1", false),
            ChatMessage::tool_result("b", "r2", false),
            ChatMessage::assistant("done"),
        ];
        // keep_last = 2 lands on the second tool result; back up past both.
        let cut = ContextCompressor::split_index(&msgs, 2);
        assert_eq!(cut, 1);
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_passthrough() {
        let failing = ContextCompressor::new(
            CompactionConfig {
                enabled: true,
                trigger_tokens: usize::MAX,
                trigger_messages: 5,
                keep_last_messages: 2,
                prompt: None,
            },
            Arc::new(ScriptedProvider::empty()), // chat() errors immediately
        );
        let msgs = long_conversation(10);
        let out = failing.before_model(msgs.clone()).await;
        assert_eq!(out.len(), msgs.len());
    }

    #[tokio::test]
    async fn disabled_compressor_is_inert() {
        let inert = ContextCompressor::new(
            CompactionConfig {
                enabled: false,
                trigger_messages: 1,
                ..CompactionConfig::default()
            },
            Arc::new(ScriptedProvider::empty()),
        );
        let msgs = long_conversation(10);
        let out = inert.before_model(msgs.clone()).await;
        assert_eq!(out.len(), msgs.len());
    }

    #[test]
    fn token_estimate_scales_with_content() {
        let small = vec![ChatMessage::user("hi")];
        let big = vec![ChatMessage::user("x".repeat(4000))];
        assert!(estimate_tokens(&big) > estimate_tokens(&small) + 500);
    }
}
