//! Event writer — the single producer of a run's events and messages.
//!
//! Owns the per-run monotonic clock: wall-clock reads that would go
//! backwards are clamped to the last issued timestamp plus one
//! microsecond, so `(ts, insertion)` ordering never inverts within a run.
//! Persistence failures are retried with bounded back-off before they
//! surface.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use mgx_domain::{
    epoch_now, Event, EventType, FinishStatus, Result, Role, StoredMessage, ToolCall,
};
use mgx_store::{EventStore, MessageStore};

const APPEND_RETRIES: u32 = 3;
const APPEND_BACKOFF: Duration = Duration::from_millis(100);

pub struct EventWriter {
    events: Arc<dyn EventStore>,
    messages: Arc<dyn MessageStore>,
    session_id: String,
    trace_id: Option<String>,
    last_ts: f64,
    finish_emitted: bool,
}

impl EventWriter {
    pub fn new(
        events: Arc<dyn EventStore>,
        messages: Arc<dyn MessageStore>,
        session_id: impl Into<String>,
        trace_id: Option<String>,
    ) -> Self {
        Self {
            events,
            messages,
            session_id: session_id.into(),
            trace_id,
            last_ts: 0.0,
            finish_emitted: false,
        }
    }

    /// Next timestamp: wall clock, clamped to be strictly increasing.
    pub fn next_ts(&mut self) -> f64 {
        let mut ts = epoch_now();
        if ts <= self.last_ts {
            ts = self.last_ts + 1e-6;
        }
        self.last_ts = ts;
        ts
    }

    pub fn finish_emitted(&self) -> bool {
        self.finish_emitted
    }

    async fn append(&self, event: Event) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.events.append_event(event.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt + 1 < APPEND_RETRIES => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "event append failed, retrying");
                    tokio::time::sleep(APPEND_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn append_message(&self, message: StoredMessage) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.messages.append_message(message.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt + 1 < APPEND_RETRIES => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "message append failed, retrying");
                    tokio::time::sleep(APPEND_BACKOFF * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn base_event(&mut self, event_type: EventType, data: Value) -> Event {
        let ts = self.next_ts();
        Event::new(self.session_id.clone(), ts, event_type, data)
            .with_trace_id(self.trace_id.clone())
    }

    // ── Taxonomy emitters ──────────────────────────────────────────

    pub async fn agent_start(
        &mut self,
        prompt: &str,
        framework: &str,
        user_message_id: &str,
    ) -> Result<()> {
        let event = self.base_event(
            EventType::AgentStart,
            json!({
                "prompt": prompt,
                "framework": framework,
                "message_id": user_message_id,
            }),
        );
        self.append(event).await
    }

    pub async fn node_start(&mut self, node: &str, namespace: &[String]) -> Result<()> {
        let event = self
            .base_event(
                EventType::NodeStart,
                json!({ "node_name": node, "namespace": namespace }),
            )
            .with_agent(node)
            .with_namespace(namespace.to_vec());
        self.append(event).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn llm_stream(
        &mut self,
        agent: &str,
        namespace: &[String],
        message_id: &str,
        delta: &str,
        content_type: &str,
        tool_call_index: Option<usize>,
        tool_call_name: Option<&str>,
        tool_call_id: Option<&str>,
    ) -> Result<()> {
        let mut data = json!({
            "delta": delta,
            "content_type": content_type,
            "message_id": message_id,
        });
        if let Some(index) = tool_call_index {
            data["tool_call_index"] = json!(index);
        }
        if let Some(name) = tool_call_name {
            data["tool_call_name"] = json!(name);
        }
        if let Some(id) = tool_call_id {
            data["tool_call_id"] = json!(id);
        }
        let event = self
            .base_event(EventType::LlmStream, data)
            .with_agent(agent)
            .with_namespace(namespace.to_vec())
            .with_message_id(message_id);
        self.append(event).await
    }

    /// Persist a completed message and emit its `message_complete` event.
    pub async fn message_complete(&mut self, mut message: StoredMessage) -> Result<()> {
        message.ts = self.next_ts();
        message.trace_id = self.trace_id.clone();

        let mut data = json!({
            "message_id": message.id,
            "role": message.role,
            "content": message.content,
            "agent_name": message.agent_name,
        });
        if !message.tool_calls.is_empty() {
            data["tool_calls"] = serde_json::to_value(&message.tool_calls)?;
        }
        if let Some(tool_call_id) = &message.tool_call_id {
            data["tool_call_id"] = json!(tool_call_id);
        }

        let event = {
            let mut event = self.base_event(EventType::MessageComplete, data);
            if let Some(agent) = &message.agent_name {
                event = event.with_agent(agent.clone());
            }
            event.with_message_id(message.id.clone())
        };

        self.append_message(message).await?;
        self.append(event).await
    }

    pub async fn tool_start(
        &mut self,
        agent: &str,
        namespace: &[String],
        tool_name: &str,
        tool_call_id: &str,
        args: &Value,
    ) -> Result<()> {
        let event = self
            .base_event(
                EventType::ToolStart,
                json!({
                    "tool_name": tool_name,
                    "tool_call_id": tool_call_id,
                    "args": args,
                }),
            )
            .with_agent(agent)
            .with_namespace(namespace.to_vec());
        self.append(event).await
    }

    pub async fn tool_end(
        &mut self,
        agent: &str,
        namespace: &[String],
        tool_name: &str,
        tool_call_id: &str,
        result: &str,
        error: bool,
    ) -> Result<()> {
        let mut data = json!({
            "tool_name": tool_name,
            "tool_call_id": tool_call_id,
            "result": result,
        });
        if error {
            data["error"] = json!(true);
        }
        let event = self
            .base_event(EventType::ToolEnd, data)
            .with_agent(agent)
            .with_namespace(namespace.to_vec());
        self.append(event).await
    }

    pub async fn node_end(&mut self, node: &str, namespace: &[String], decision: &str) -> Result<()> {
        let event = self
            .base_event(
                EventType::NodeEnd,
                json!({ "node_name": node, "decision": decision }),
            )
            .with_agent(node)
            .with_namespace(namespace.to_vec());
        self.append(event).await
    }

    pub async fn stage_change(&mut self, from: &str, to: &str) -> Result<()> {
        let event = self.base_event(
            EventType::StageChange,
            json!({ "from_stage": from, "to_stage": to }),
        );
        self.append(event).await
    }

    pub async fn custom(&mut self, custom_type: &str, payload: Value) -> Result<()> {
        let event = self.base_event(
            EventType::Custom,
            json!({ "custom_type": custom_type, "payload": payload }),
        );
        self.append(event).await
    }

    pub async fn agent_error(
        &mut self,
        error: &str,
        error_type: &str,
        namespace: &[String],
    ) -> Result<()> {
        let event = self
            .base_event(
                EventType::AgentError,
                json!({
                    "error": error,
                    "error_type": error_type,
                    "namespace": namespace,
                }),
            )
            .with_namespace(namespace.to_vec());
        self.append(event).await
    }

    /// Emit the run's terminal event. Exactly one per run: repeated calls
    /// are no-ops.
    pub async fn finish(&mut self, status: FinishStatus, reason: Option<&str>) -> Result<()> {
        if self.finish_emitted {
            return Ok(());
        }
        let mut data = json!({ "status": status });
        if let Some(reason) = reason {
            data["reason"] = json!(reason);
        }
        let event = self.base_event(EventType::Finish, data);
        self.append(event).await?;
        self.finish_emitted = true;
        Ok(())
    }

    /// Persist the tool-result message for a tool call.
    pub async fn tool_message(
        &mut self,
        agent: &str,
        message_id: &str,
        tool_call_id: &str,
        content: &str,
        error: bool,
    ) -> Result<()> {
        let mut message =
            StoredMessage::tool(self.session_id.clone(), agent, tool_call_id, content, 0.0)
                .with_id(message_id);
        if error {
            message.metadata = Some(json!({ "is_error": true }));
        }
        self.message_complete(message).await
    }

    /// Build an assistant [`StoredMessage`] for this session.
    pub fn assistant_message(
        &self,
        agent: &str,
        message_id: &str,
        content: &str,
        tool_calls: Vec<ToolCall>,
    ) -> StoredMessage {
        StoredMessage::assistant(self.session_id.clone(), agent, content, 0.0)
            .with_id(message_id)
            .with_tool_calls(tool_calls)
    }

    /// Whether a stored message may serve as the run's prompt.
    pub fn is_user_turn(message: &StoredMessage) -> bool {
        message.role == Role::User
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_store::MemoryStore;

    fn writer(store: &Arc<MemoryStore>) -> EventWriter {
        EventWriter::new(store.clone(), store.clone(), "s1", Some("trace-1".into()))
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        let mut prev = 0.0;
        for _ in 0..100 {
            let ts = w.next_ts();
            assert!(ts > prev);
            prev = ts;
        }
    }

    #[tokio::test]
    async fn finish_is_emitted_once() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.finish(FinishStatus::Success, None).await.unwrap();
        w.finish(FinishStatus::Failed, Some("late")).await.unwrap();

        let events = store.events_snapshot("s1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].finish_status(), Some(FinishStatus::Success));
        assert!(w.finish_emitted());
    }

    #[tokio::test]
    async fn message_complete_persists_message_and_event() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        let msg = w.assistant_message(
            "boss",
            "m1",
            "hello",
            vec![ToolCall {
                id: "tc_1".into(),
                name: "write_file".into(),
                arguments: json!({}),
            }],
        );
        w.message_complete(msg).await.unwrap();

        let messages = store.messages_snapshot("s1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "m1");
        assert!(messages[0].ts > 0.0);

        let events = store.events_snapshot("s1");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::MessageComplete);
        assert_eq!(events[0].message_id.as_deref(), Some("m1"));
        assert_eq!(events[0].data["tool_calls"][0]["name"], "write_file");
        assert_eq!(events[0].trace_id.as_deref(), Some("trace-1"));
    }

    #[tokio::test]
    async fn llm_stream_carries_tool_call_fields() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.llm_stream(
            "engineer",
            &[],
            "m7",
            "{\"pa",
            "tool_call",
            Some(0),
            Some("write_file"),
            Some("tc_1"),
        )
        .await
        .unwrap();

        let events = store.events_snapshot("s1");
        let data = &events[0].data;
        assert_eq!(data["content_type"], "tool_call");
        assert_eq!(data["tool_call_index"], 0);
        assert_eq!(data["tool_call_name"], "write_file");
        assert_eq!(data["tool_call_id"], "tc_1");
        assert_eq!(events[0].agent_name.as_deref(), Some("engineer"));
    }

    #[tokio::test]
    async fn tool_end_error_marker() {
        let store = Arc::new(MemoryStore::new());
        let mut w = writer(&store);
        w.tool_end("qa", &[], "run_command", "tc_9", "boom", true)
            .await
            .unwrap();
        let events = store.events_snapshot("s1");
        assert_eq!(events[0].data["error"], true);

        w.tool_end("qa", &[], "run_command", "tc_10", "ok", false)
            .await
            .unwrap();
        let events = store.events_snapshot("s1");
        assert!(events[1].data.get("error").is_none());
    }
}
