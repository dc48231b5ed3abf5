//! End-to-end runs over the in-memory store and the scripted provider.

use std::sync::Arc;

use serde_json::json;

use mgx_domain::config::{TeamConfig, ToolsConfig};
use mgx_domain::{epoch_now, EventType, FinishStatus, Framework, Role, StoredMessage};
use mgx_providers::{LlmProvider, ProviderRegistry, ScriptedProvider, ScriptedTurn};
use mgx_runtime::{run_session, RunConfig, RunParams};
use mgx_store::{MemoryStore, MessageStore};

struct Harness {
    store: Arc<MemoryStore>,
    workspace: tempfile::TempDir,
}

impl Harness {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            workspace: tempfile::TempDir::new().unwrap(),
        }
    }

    async fn push_user(&self, session_id: &str, prompt: &str) -> StoredMessage {
        let msg = StoredMessage::user(session_id, prompt, epoch_now());
        self.store.append_message(msg.clone()).await.unwrap();
        msg
    }

    async fn run(&self, session_id: &str, turns: Vec<ScriptedTurn>) -> FinishStatus {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider::new(turns));
        let providers = Arc::new(ProviderRegistry::single("scripted", provider));
        let tools = mgx_tools::builtin_registry(&ToolsConfig::default()).unwrap();

        let params = RunParams {
            session_id: session_id.into(),
            workspace_id: "ws-1".into(),
            workspace_path: self.workspace.path().to_path_buf(),
            framework: Framework::Nextjs,
            trace_id: None,
        };
        let config = RunConfig {
            team: TeamConfig {
                max_transitions: 12,
                ..TeamConfig::default()
            },
            retry_attempts: 1,
            retry_base_ms: 1,
            ..RunConfig::default()
        };

        run_session(
            params,
            self.store.clone(),
            self.store.clone(),
            providers,
            tools,
            config,
        )
        .await
        .unwrap()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 1 — single-turn happy path
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn single_turn_happy_path() {
    let h = Harness::new();
    h.push_user("s1", "hello").await;

    let status = h
        .run(
            "s1",
            vec![ScriptedTurn::text("hi there! <next_action>end</next_action>")],
        )
        .await;
    assert_eq!(status, FinishStatus::Success);

    let events = h.store.events_snapshot("s1");

    // Canonical events, customs filtered out, in order.
    let canonical: Vec<_> = events
        .iter()
        .filter(|e| e.event_type != EventType::Custom)
        .collect();
    let kinds: Vec<EventType> = canonical.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds[0], EventType::AgentStart);
    assert_eq!(kinds[1], EventType::NodeStart);
    assert!(kinds[2..].starts_with(&[EventType::LlmStream]));
    let complete_pos = kinds
        .iter()
        .position(|k| *k == EventType::MessageComplete)
        .unwrap();
    assert!(kinds[2..complete_pos]
        .iter()
        .all(|k| *k == EventType::LlmStream));
    assert_eq!(kinds[complete_pos + 1], EventType::NodeEnd);
    assert_eq!(*kinds.last().unwrap(), EventType::Finish);

    // node_start names the boss; node_end carries the decision.
    assert_eq!(canonical[1].data["node_name"], "boss");
    let node_end = canonical
        .iter()
        .find(|e| e.event_type == EventType::NodeEnd)
        .unwrap();
    assert_eq!(node_end.data["decision"], "end");

    // All llm_stream events share one message id, matched by the complete.
    let stream_ids: Vec<_> = canonical
        .iter()
        .filter(|e| e.event_type == EventType::LlmStream)
        .map(|e| e.message_id.clone().unwrap())
        .collect();
    assert!(!stream_ids.is_empty());
    assert!(stream_ids.windows(2).all(|w| w[0] == w[1]));
    let complete = canonical
        .iter()
        .find(|e| e.event_type == EventType::MessageComplete)
        .unwrap();
    assert_eq!(complete.message_id.as_ref(), Some(&stream_ids[0]));
    assert_eq!(complete.data["role"], "assistant");

    // Follow-up history: [user{hello}, assistant].
    let messages = h.store.messages_snapshot("s1");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "hello");
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].id, stream_ids[0]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 2 — multi-node routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn multi_node_routing_distinct_message_ids() {
    let h = Harness::new();
    h.push_user("s2", "build me an app").await;

    let status = h
        .run(
            "s2",
            vec![
                ScriptedTurn::text("requirements ok <next_action>continue</next_action>"),
                ScriptedTurn::text("prd written <next_action>end</next_action>"),
            ],
        )
        .await;
    assert_eq!(status, FinishStatus::Success);

    let events = h.store.events_snapshot("s2");

    // Two node_start events: boss then product_manager, with boss's
    // node_end in between.
    let node_starts: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::NodeStart)
        .map(|e| e.data["node_name"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(node_starts, vec!["boss", "product_manager"]);

    let boss_end = events
        .iter()
        .position(|e| e.event_type == EventType::NodeEnd && e.data["node_name"] == "boss")
        .unwrap();
    let pm_start = events
        .iter()
        .position(|e| {
            e.event_type == EventType::NodeStart && e.data["node_name"] == "product_manager"
        })
        .unwrap();
    assert!(boss_end < pm_start);

    // Each node's burst has its own message id; m1 != m2, each with
    // llm_stream+ then message_complete.
    let completes: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::MessageComplete)
        .collect();
    assert_eq!(completes.len(), 2);
    let m1 = completes[0].message_id.clone().unwrap();
    let m2 = completes[1].message_id.clone().unwrap();
    assert_ne!(m1, m2);

    for mid in [&m1, &m2] {
        let with_id: Vec<_> = events
            .iter()
            .filter(|e| e.message_id.as_ref() == Some(mid))
            .collect();
        assert!(with_id.len() >= 2);
        let (last, init) = with_id.split_last().unwrap();
        assert!(init.iter().all(|e| e.event_type == EventType::LlmStream));
        assert_eq!(last.event_type, EventType::MessageComplete);
    }

    // Exactly one finish, and a stage_change into product definition.
    let finishes: Vec<_> = events
        .iter()
        .filter(|e| e.event_type == EventType::Finish)
        .collect();
    assert_eq!(finishes.len(), 1);
    assert!(events.iter().any(|e| {
        e.event_type == EventType::StageChange && e.data["to_stage"] == "product_definition"
    }));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scenario 3 — tool call
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn tool_call_flow_and_workspace_effect() {
    let h = Harness::new();
    h.push_user("s3", "write a.txt").await;

    let status = h
        .run(
            "s3",
            vec![
                ScriptedTurn::tool("write_file", json!({ "path": "a.txt", "content": "x" })),
                ScriptedTurn::text("written <next_action>end</next_action>"),
            ],
        )
        .await;
    assert_eq!(status, FinishStatus::Success);

    // The workspace contains the file.
    assert_eq!(
        std::fs::read_to_string(h.workspace.path().join("a.txt")).unwrap(),
        "x"
    );

    let events = h.store.events_snapshot("s3");

    // Tool-call streaming: deltas with content_type=tool_call carrying
    // index, name, and id.
    let tool_deltas: Vec<_> = events
        .iter()
        .filter(|e| {
            e.event_type == EventType::LlmStream && e.data["content_type"] == "tool_call"
        })
        .collect();
    assert!(!tool_deltas.is_empty());
    let named = tool_deltas
        .iter()
        .find(|e| e.data["tool_call_name"] == "write_file")
        .expect("a tool_call delta names the tool");
    assert_eq!(named.data["tool_call_index"], 0);
    let call_id = named.data["tool_call_id"].as_str().unwrap().to_owned();

    // message_complete for the assistant turn consolidates tool_calls.
    let assistant_complete = events
        .iter()
        .find(|e| {
            e.event_type == EventType::MessageComplete && e.data["role"] == "assistant"
                && !e.data["tool_calls"].is_null()
        })
        .unwrap();
    assert_eq!(assistant_complete.data["tool_calls"][0]["id"], call_id.as_str());
    assert_eq!(
        assistant_complete.data["tool_calls"][0]["name"],
        "write_file"
    );

    // tool_start then tool_end for the same call id.
    let start = events
        .iter()
        .position(|e| e.event_type == EventType::ToolStart && e.data["tool_call_id"] == call_id.as_str())
        .unwrap();
    let end = events
        .iter()
        .position(|e| e.event_type == EventType::ToolEnd && e.data["tool_call_id"] == call_id.as_str())
        .unwrap();
    assert!(start < end);
    assert!(events[end].data.get("error").is_none());

    // A tool-role message_complete follows, linked by tool_call_id.
    let tool_complete = events
        .iter()
        .find(|e| e.event_type == EventType::MessageComplete && e.data["role"] == "tool")
        .unwrap();
    assert_eq!(tool_complete.data["tool_call_id"], call_id.as_str());

    // Stored messages: at-most-one tool message per call id, after the
    // assistant that requested it.
    let messages = h.store.messages_snapshot("s3");
    let assistant_ts = messages
        .iter()
        .find(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
        .unwrap()
        .ts;
    let tool_msgs: Vec<_> = messages
        .iter()
        .filter(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(call_id.as_str()))
        .collect();
    assert_eq!(tool_msgs.len(), 1);
    assert!(tool_msgs[0].ts > assistant_ts);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Property 4 — runs without a user turn stop immediately
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn empty_session_stops_without_nodes() {
    let h = Harness::new();
    let status = h.run("s4", vec![ScriptedTurn::text("unused")]).await;
    assert_eq!(status, FinishStatus::Stopped);

    let events = h.store.events_snapshot("s4");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].finish_status(), Some(FinishStatus::Stopped));
    assert_eq!(events[0].data["reason"], "no-user-turn");
}

#[tokio::test]
async fn non_user_last_message_stops_without_nodes() {
    let h = Harness::new();
    h.push_user("s5", "hello").await;
    h.store
        .append_message(StoredMessage::assistant("s5", "boss", "done", epoch_now()))
        .await
        .unwrap();

    let status = h.run("s5", vec![ScriptedTurn::text("unused")]).await;
    assert_eq!(status, FinishStatus::Stopped);
    let events = h.store.events_snapshot("s5");
    assert!(events
        .iter()
        .all(|e| e.event_type != EventType::NodeStart));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Universal invariants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tokio::test]
async fn event_timestamps_are_nondecreasing_with_single_finish() {
    let h = Harness::new();
    h.push_user("s6", "go").await;
    h.run(
        "s6",
        vec![
            ScriptedTurn::tool("write_file", json!({ "path": "b.txt", "content": "y" })),
            ScriptedTurn::text("ok <next_action>continue</next_action>"),
            ScriptedTurn::text("prd <next_action>end</next_action>"),
        ],
    )
    .await;

    let events = h.store.events_snapshot("s6");
    let ts: Vec<f64> = events.iter().map(|e| e.ts).collect();
    assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == EventType::Finish)
            .count(),
        1
    );
}

#[tokio::test]
async fn model_failure_emits_agent_error_then_failed_finish() {
    let h = Harness::new();
    h.push_user("s7", "go").await;

    // Boss continues, then the script is exhausted → model error on the
    // product manager node after retries.
    let status = h
        .run(
            "s7",
            vec![ScriptedTurn::text("go on <next_action>continue</next_action>")],
        )
        .await;
    assert_eq!(status, FinishStatus::Failed);

    let events = h.store.events_snapshot("s7");
    let error_pos = events
        .iter()
        .position(|e| e.event_type == EventType::AgentError)
        .expect("agent_error expected");
    let finish_pos = events
        .iter()
        .position(|e| e.event_type == EventType::Finish)
        .unwrap();
    assert!(error_pos < finish_pos);
    assert_eq!(
        events[finish_pos].finish_status(),
        Some(FinishStatus::Failed)
    );
}
