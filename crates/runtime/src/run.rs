//! One end-to-end run: input resolution, graph drive, event translation,
//! exactly-one finish.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use mgx_agents::{Agent, AgentEvent, ContextCompressor, LlmContentType, Middleware};
use mgx_context::AgentContext;
use mgx_domain::config::{CompactionConfig, TeamConfig};
use mgx_domain::{
    ChatMessage, Error, FinishStatus, Framework, Result, TeamState,
};
use mgx_graph::{team_graph, GraphEmit, GraphEndReason, GraphItem, GraphRunner};
use mgx_providers::ProviderRegistry;
use mgx_store::{EventStore, MessageStore};
use mgx_tools::ToolRegistry;

use crate::writer::EventWriter;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parameters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Identity of the run being executed.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub session_id: String,
    pub workspace_id: String,
    pub workspace_path: PathBuf,
    pub framework: Framework,
    pub trace_id: Option<String>,
}

/// Tunables, lifted from the application config.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub team: TeamConfig,
    pub compaction: CompactionConfig,
    /// Bounded retry attempts for model calls.
    pub retry_attempts: u32,
    pub retry_base_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            team: TeamConfig::default(),
            compaction: CompactionConfig::default(),
            retry_attempts: 3,
            retry_base_ms: 500,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run_session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Execute one run for a session and return its terminal status.
///
/// The prompt must already be durably recorded: the last stored message
/// has to be a user turn, otherwise the run finishes immediately with
/// `stopped` and no node executes.
pub async fn run_session(
    params: RunParams,
    events: Arc<dyn EventStore>,
    messages: Arc<dyn MessageStore>,
    providers: Arc<ProviderRegistry>,
    tools: ToolRegistry,
    config: RunConfig,
) -> Result<FinishStatus> {
    let mut writer = EventWriter::new(
        events.clone(),
        messages.clone(),
        params.session_id.clone(),
        params.trace_id.clone(),
    );

    // ── Input resolution ──────────────────────────────────────────
    let last = messages.last_message(&params.session_id).await?;
    let user_turn = match last {
        Some(message) if EventWriter::is_user_turn(&message) => message,
        _ => {
            tracing::warn!(session_id = %params.session_id, "no user turn to execute");
            writer
                .finish(FinishStatus::Stopped, Some("no-user-turn"))
                .await?;
            return Ok(FinishStatus::Stopped);
        }
    };

    writer
        .agent_start(&user_turn.content, params.framework.as_str(), &user_turn.id)
        .await?;

    // ── History rehydration ───────────────────────────────────────
    let history = messages
        .list_messages(&params.session_id, config.team.history_limit)
        .await?;
    let mut state = TeamState::new(params.framework, params.workspace_id.clone());
    for stored in &history {
        if let Some(chat) = ChatMessage::from_stored(stored) {
            state.push_message(chat);
        }
    }

    // ── Agent construction ────────────────────────────────────────
    let Some(provider) = providers.default_provider() else {
        writer
            .agent_error("no LLM provider available for this run", "config_error", &[])
            .await?;
        writer.finish(FinishStatus::Failed, Some("no-provider")).await?;
        return Ok(FinishStatus::Failed);
    };
    let compressor: Arc<dyn Middleware> = Arc::new(ContextCompressor::new(
        config.compaction.clone(),
        providers.summarizer().unwrap_or_else(|| provider.clone()),
    ));

    let retry = mgx_agents::agent::RetryPolicy {
        attempts: config.retry_attempts.max(1),
        base_delay: std::time::Duration::from_millis(config.retry_base_ms),
    };
    let mut agents = HashMap::new();
    for mut spec in mgx_agents::team_specs(params.framework) {
        spec.max_tool_loops = spec.max_tool_loops.min(config.team.max_tool_loops);
        let subset = tools.subset(&spec.tools);
        let name = spec.name.clone();
        agents.insert(
            name,
            Arc::new(
                Agent::new(spec, provider.clone(), subset, vec![compressor.clone()])
                    .with_retry(retry),
            ),
        );
    }

    let graph = Arc::new(team_graph(config.team.max_transitions));
    let runner = GraphRunner::new(graph, agents);

    // ── Context scope ─────────────────────────────────────────────
    let ctx = Arc::new({
        let mut ctx = AgentContext::new(
            params.session_id.clone(),
            params.workspace_id.clone(),
            &params.workspace_path,
            events.clone(),
            messages.clone(),
        );
        ctx.trace_id = params.trace_id.clone();
        ctx
    });

    // ── Drive the graph, translating its stream into events ───────
    let (tx, mut rx) = mpsc::channel::<GraphEmit>(1024);

    let run_fut = mgx_context::with_context(ctx, async {
        let run = runner.run(state, &tx).await;
        drop(tx);
        run
    });

    // Keep draining after a persistence failure — a blocked channel would
    // wedge the graph side of the join.
    let consume_fut = async {
        let mut first_err: Option<Error> = None;
        while let Some(emit) = rx.recv().await {
            if first_err.is_none() {
                if let Err(e) = translate(&mut writer, emit).await {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    };

    let (run, consumed) = tokio::join!(run_fut, consume_fut);

    if let Err(e) = consumed {
        tracing::error!(error = %e, "event persistence failed");
        let _ = writer.finish(FinishStatus::Failed, Some("persistence")).await;
        return Err(e);
    }

    // ── Terminal event ────────────────────────────────────────────
    let status = match run.end {
        GraphEndReason::Finished => {
            writer.finish(FinishStatus::Success, None).await?;
            FinishStatus::Success
        }
        GraphEndReason::Capped => {
            writer
                .finish(FinishStatus::Failed, Some("transition-cap"))
                .await?;
            FinishStatus::Failed
        }
        GraphEndReason::Errored { node, error } => {
            writer.agent_error(&error, "model_error", &[]).await?;
            writer.finish(FinishStatus::Failed, Some(&error)).await?;
            tracing::error!(%node, %error, "run failed");
            FinishStatus::Failed
        }
    };

    tracing::info!(session_id = %params.session_id, ?status, "run finished");
    Ok(status)
}

/// Map one graph item onto the persisted event taxonomy.
async fn translate(writer: &mut EventWriter, emit: GraphEmit) -> Result<()> {
    let ns = emit.namespace;
    match emit.item {
        GraphItem::NodeStart { node } => writer.node_start(&node, &ns).await,
        GraphItem::StageChange { from, to } => {
            writer.stage_change(from.as_str(), to.as_str()).await
        }
        GraphItem::NodeEnd { node, decision } => {
            writer.node_end(&node, &ns, &decision.next_action).await
        }
        GraphItem::Warning { node, message } => {
            writer
                .custom("warning", json!({ "node": node, "message": message }))
                .await
        }
        GraphItem::StateUpdate {
            node,
            iteration,
            decision,
            documents_updated,
        } => {
            writer
                .custom(
                    "state_update",
                    json!({
                        "node": node,
                        "iteration": iteration,
                        "decision": decision.next_action,
                        "documents_updated": documents_updated,
                    }),
                )
                .await
        }
        GraphItem::Agent { node, event } => match event {
            AgentEvent::LlmDelta {
                message_id,
                delta,
                content_type,
                tool_call_index,
                tool_call_name,
                tool_call_id,
            } => {
                let content_type = match content_type {
                    LlmContentType::Text => "text",
                    LlmContentType::ToolCall => "tool_call",
                };
                writer
                    .llm_stream(
                        &node,
                        &ns,
                        &message_id,
                        &delta,
                        content_type,
                        tool_call_index,
                        tool_call_name.as_deref(),
                        tool_call_id.as_deref(),
                    )
                    .await
            }
            AgentEvent::AssistantComplete {
                message_id,
                content,
                tool_calls,
            } => {
                let message = writer.assistant_message(&node, &message_id, &content, tool_calls);
                writer.message_complete(message).await
            }
            AgentEvent::ToolStart {
                tool_call_id,
                tool_name,
                args,
            } => {
                writer
                    .tool_start(&node, &ns, &tool_name, &tool_call_id, &args)
                    .await
            }
            AgentEvent::ToolEnd {
                tool_call_id,
                tool_name,
                result,
                error,
            } => {
                writer
                    .tool_end(&node, &ns, &tool_name, &tool_call_id, &result, error)
                    .await
            }
            AgentEvent::ToolMessage {
                message_id,
                tool_call_id,
                content,
                error,
            } => {
                writer
                    .tool_message(&node, &message_id, &tool_call_id, &content, error)
                    .await
            }
        },
    }
}
