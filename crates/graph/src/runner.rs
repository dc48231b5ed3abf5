//! Streaming graph execution.
//!
//! [`GraphRunner::run`] walks the graph on the caller's task (so the
//! caller's agent-context scope propagates into tool calls), forwarding
//! typed items over an mpsc channel as they happen. A hard cap on node
//! transitions bounds runaway routing loops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use mgx_agents::{Agent, AgentEvent, AgentOutcome};
use mgx_domain::{Decision, DocumentKind, Stage, TeamState};

use crate::decide::extract_decision;
use crate::route::{Graph, Target};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Emitted items
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One step of a streaming graph invocation.
#[derive(Debug, Clone)]
pub enum GraphItem {
    NodeStart {
        node: String,
    },
    /// An event from the node's agent (token deltas, tool activity).
    Agent {
        node: String,
        event: AgentEvent,
    },
    StageChange {
        from: Stage,
        to: Stage,
    },
    /// The state delta applied after a node completed.
    StateUpdate {
        node: String,
        iteration: u32,
        decision: Decision,
        documents_updated: Vec<DocumentKind>,
    },
    NodeEnd {
        node: String,
        decision: Decision,
    },
    Warning {
        node: String,
        message: String,
    },
}

/// An item tagged with the subgraph scope it originated in (empty for the
/// root graph).
#[derive(Debug, Clone)]
pub struct GraphEmit {
    pub namespace: Vec<String>,
    pub item: GraphItem,
}

/// Why the run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEndReason {
    /// A node routed to the terminal.
    Finished,
    /// An agent failed fatally (model error after retries).
    Errored { node: String, error: String },
    /// The transition cap was hit.
    Capped,
}

#[derive(Debug)]
pub struct GraphRun {
    pub state: TeamState,
    pub end: GraphEndReason,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GraphRunner {
    graph: Arc<Graph>,
    agents: HashMap<String, Arc<Agent>>,
    namespace: Vec<String>,
}

impl GraphRunner {
    /// `agents` must contain one agent per graph node, keyed by node name.
    pub fn new(graph: Arc<Graph>, agents: HashMap<String, Arc<Agent>>) -> Self {
        Self {
            graph,
            agents,
            namespace: Vec::new(),
        }
    }

    /// Scope this runner as a subgraph; emitted items carry the path.
    pub fn with_namespace(mut self, namespace: Vec<String>) -> Self {
        self.namespace = namespace;
        self
    }

    async fn emit(&self, tx: &mpsc::Sender<GraphEmit>, item: GraphItem) {
        let _ = tx
            .send(GraphEmit {
                namespace: self.namespace.clone(),
                item,
            })
            .await;
    }

    /// Drive the graph to completion, streaming items to `tx`.
    ///
    /// Runs on the caller's task so the current agent context follows into
    /// every tool invocation.
    pub async fn run(&self, mut state: TeamState, tx: &mpsc::Sender<GraphEmit>) -> GraphRun {
        let mut current = self.graph.entry().to_owned();
        let mut transitions: u32 = 0;

        loop {
            transitions += 1;
            if transitions > self.graph.max_transitions {
                self.emit(
                    tx,
                    GraphItem::Warning {
                        node: current.clone(),
                        message: format!(
                            "transition cap reached ({}); ending run",
                            self.graph.max_transitions
                        ),
                    },
                )
                .await;
                return GraphRun {
                    state,
                    end: GraphEndReason::Capped,
                };
            }
            state.iteration = transitions;

            let Some(node) = self.graph.node(&current) else {
                return GraphRun {
                    end: GraphEndReason::Errored {
                        node: current.clone(),
                        error: format!("node '{current}' not found in graph"),
                    },
                    state,
                };
            };
            let Some(agent) = self.agents.get(&current).cloned() else {
                return GraphRun {
                    end: GraphEndReason::Errored {
                        node: current.clone(),
                        error: format!("no agent bound to node '{current}'"),
                    },
                    state,
                };
            };

            if node.stage != state.stage {
                self.emit(
                    tx,
                    GraphItem::StageChange {
                        from: state.stage,
                        to: node.stage,
                    },
                )
                .await;
                state.stage = node.stage;
            }

            self.emit(
                tx,
                GraphItem::NodeStart {
                    node: current.clone(),
                },
            )
            .await;
            tracing::debug!(node = %current, transitions, "node started");

            // Run the agent on this task, forwarding its events as they
            // arrive. The sender is dropped when the invocation returns so
            // the forwarder terminates.
            let history = state.messages.clone();
            let (atx, mut arx) = mpsc::channel::<AgentEvent>(256);
            let invoke = {
                let agent = agent.clone();
                async move {
                    let result = agent.invoke(&history, &atx).await;
                    drop(atx);
                    result
                }
            };
            let forward = async {
                while let Some(event) = arx.recv().await {
                    self.emit(
                        tx,
                        GraphItem::Agent {
                            node: current.clone(),
                            event,
                        },
                    )
                    .await;
                }
            };
            let (result, ()) = tokio::join!(invoke, forward);

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(node = %current, error = %e, "agent failed");
                    return GraphRun {
                        end: GraphEndReason::Errored {
                            node: current.clone(),
                            error: e.to_string(),
                        },
                        state,
                    };
                }
            };

            // Apply the node's output to the shared state.
            state.messages.extend(outcome.appended.iter().cloned());
            let documents_updated = harvest_documents(&outcome, &mut state);

            let (decision, channel) = extract_decision(&outcome);
            tracing::debug!(node = %current, action = %decision.next_action, ?channel, "node decided");

            let (target, warning) = self.graph.route(&current, &decision);
            if let Some(message) = warning {
                tracing::warn!(node = %current, %message, "routing warning");
                self.emit(
                    tx,
                    GraphItem::Warning {
                        node: current.clone(),
                        message,
                    },
                )
                .await;
            }

            state.last_decision = Some(decision.clone());
            self.emit(
                tx,
                GraphItem::StateUpdate {
                    node: current.clone(),
                    iteration: transitions,
                    decision: decision.clone(),
                    documents_updated,
                },
            )
            .await;
            self.emit(
                tx,
                GraphItem::NodeEnd {
                    node: current.clone(),
                    decision,
                },
            )
            .await;

            match target {
                Target::End => {
                    return GraphRun {
                        state,
                        end: GraphEndReason::Finished,
                    }
                }
                Target::Node(next) => current = next,
            }
        }
    }
}

/// Capture well-known documents written by the node into the state slots.
///
/// A document slot is filled when the node's assistant messages carry a
/// `write_file` call targeting the document's well-known file name.
fn harvest_documents(outcome: &AgentOutcome, state: &mut TeamState) -> Vec<DocumentKind> {
    const KINDS: [DocumentKind; 5] = [
        DocumentKind::Requirements,
        DocumentKind::Prd,
        DocumentKind::Design,
        DocumentKind::Tasks,
        DocumentKind::TestReport,
    ];

    let mut updated = Vec::new();
    for message in &outcome.appended {
        for tc in message.tool_calls() {
            if tc.name != "write_file" {
                continue;
            }
            let Some(path) = tc.arguments.get("path").and_then(|p| p.as_str()) else {
                continue;
            };
            let Some(content) = tc.arguments.get("content").and_then(|c| c.as_str()) else {
                continue;
            };
            for kind in KINDS {
                if path == kind.file_name() {
                    state.documents.set(kind, content.to_owned());
                    if !updated.contains(&kind) {
                        updated.push(kind);
                    }
                }
            }
        }
    }
    updated
}
