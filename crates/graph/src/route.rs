//! Node arena and the fixed routing table.

use std::collections::HashMap;

use mgx_domain::{Decision, Stage};

/// Where an edge leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Node(String),
    End,
}

/// Outgoing edges of one node.
#[derive(Debug, Clone)]
pub struct RouteSet {
    /// The linear successor, taken for `continue` and unknown actions.
    pub on_continue: Target,
    /// Conditional edges keyed by `next_action`.
    pub actions: HashMap<String, Target>,
}

/// One node of the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub name: String,
    /// Team stage this node's work belongs to.
    pub stage: Stage,
}

#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, GraphNode>,
    routes: HashMap<String, RouteSet>,
    entry: String,
    pub max_transitions: u32,
}

impl Graph {
    pub fn new(
        nodes: Vec<GraphNode>,
        routes: HashMap<String, RouteSet>,
        entry: impl Into<String>,
        max_transitions: u32,
    ) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.name.clone(), n)).collect(),
            routes,
            entry: entry.into(),
            max_transitions,
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.keys().map(|s| s.as_str()).collect()
    }

    /// Resolve a decision into a target.
    ///
    /// `end` is valid from every node. Unknown actions fall back to the
    /// linear successor with a warning message for the caller to surface.
    pub fn route(&self, node: &str, decision: &Decision) -> (Target, Option<String>) {
        let routes = match self.routes.get(node) {
            Some(r) => r,
            None => {
                return (
                    Target::End,
                    Some(format!("node '{node}' has no routes; ending run")),
                )
            }
        };

        let action = decision.next_action.as_str();
        if action == Decision::END {
            return (Target::End, None);
        }
        if action == Decision::CONTINUE {
            return (routes.on_continue.clone(), None);
        }
        match routes.actions.get(action) {
            Some(target) => (target.clone(), None),
            None => (
                routes.on_continue.clone(),
                Some(format!(
                    "unknown action '{action}' from node '{node}'; treating as continue"
                )),
            ),
        }
    }
}

/// The fixed team graph:
///
/// | node            | continue        | conditional                        |
/// |-----------------|-----------------|------------------------------------|
/// | boss            | product_manager |                                    |
/// | product_manager | architect       | back_to_boss                       |
/// | architect       | project_manager | back_to_pm                         |
/// | project_manager | engineer        | back_to_architect, back_to_pm      |
/// | engineer        | qa              | continue_development, back_to_architect |
/// | qa              | TERM            | back_to_engineer                   |
///
/// plus `end` → TERM from every node.
pub fn team_graph(max_transitions: u32) -> Graph {
    let node = |name: &str, stage: Stage| GraphNode {
        name: name.into(),
        stage,
    };
    let to = |name: &str| Target::Node(name.into());

    let nodes = vec![
        node("boss", Stage::Requirements),
        node("product_manager", Stage::ProductDefinition),
        node("architect", Stage::Design),
        node("project_manager", Stage::Planning),
        node("engineer", Stage::Development),
        node("qa", Stage::Testing),
    ];

    let mut routes = HashMap::new();
    routes.insert(
        "boss".into(),
        RouteSet {
            on_continue: to("product_manager"),
            actions: HashMap::new(),
        },
    );
    routes.insert(
        "product_manager".into(),
        RouteSet {
            on_continue: to("architect"),
            actions: HashMap::from([("back_to_boss".into(), to("boss"))]),
        },
    );
    routes.insert(
        "architect".into(),
        RouteSet {
            on_continue: to("project_manager"),
            actions: HashMap::from([("back_to_pm".into(), to("product_manager"))]),
        },
    );
    routes.insert(
        "project_manager".into(),
        RouteSet {
            on_continue: to("engineer"),
            actions: HashMap::from([
                ("back_to_architect".into(), to("architect")),
                ("back_to_pm".into(), to("product_manager")),
            ]),
        },
    );
    routes.insert(
        "engineer".into(),
        RouteSet {
            on_continue: to("qa"),
            actions: HashMap::from([
                ("continue_development".into(), to("engineer")),
                ("back_to_architect".into(), to("architect")),
            ]),
        },
    );
    routes.insert(
        "qa".into(),
        RouteSet {
            on_continue: Target::End,
            actions: HashMap::from([("back_to_engineer".into(), to("engineer"))]),
        },
    );

    Graph::new(nodes, routes, "boss", max_transitions)
}
