//! Graph orchestrator — the state machine over the agent team.
//!
//! Nodes live in an arena keyed by name; edges are a routing table mapping
//! `(node, next_action)` to a successor or the terminal. Routing decisions
//! come from the workflow-decision tool call when present, else from a
//! delimited marker in the node's final text, else default to `continue`.

pub mod decide;
pub mod route;
pub mod runner;

pub use decide::{extract_decision, DecisionChannel};
pub use route::{team_graph, Graph, GraphNode, RouteSet, Target};
pub use runner::{GraphEmit, GraphEndReason, GraphItem, GraphRun, GraphRunner};
