//! Tool registry — the side-effecting functions visible to agents.
//!
//! Tools resolve their workspace through the current
//! [`AgentContext`](mgx_context::AgentContext); errors are reported as tool
//! results with an error marker, never thrown, so the LLM observes the
//! failure and can react.

pub mod decision;
pub mod dev_server;
pub mod exec;
pub mod workspace_ops;

pub use decision::{decision_from_args, RecordDecisionTool, DECISION_TOOL_NAME};

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use mgx_domain::config::ToolsConfig;
use mgx_domain::{Result, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool contract
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Structured success payload, serialized to a JSON string.
    pub fn json(value: Value) -> Self {
        Self::ok(value.to_string())
    }
}

#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn invoke(&self, args: Value) -> ToolOutcome;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for the LLM, sorted by name for deterministic prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> =
            self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// A registry restricted to the named tools. Unknown names are skipped
    /// with a warning so a typo in a role's tool list degrades gracefully.
    pub fn subset(&self, names: &[String]) -> ToolRegistry {
        let mut out = ToolRegistry::new();
        for name in names {
            match self.tools.get(name) {
                Some(tool) => out.register(tool.clone()),
                None => tracing::warn!(tool = %name, "unknown tool in role subset"),
            }
        }
        out
    }

    /// Invoke a tool by name. Unknown tools yield an error outcome.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolOutcome {
        match self.tools.get(name) {
            Some(tool) => tool.invoke(args).await,
            None => ToolOutcome::error(format!("unknown tool '{name}'")),
        }
    }
}

/// Build the full built-in registry: workspace I/O, confined exec,
/// dev-server lifecycle, and the workflow-decision sentinel.
pub fn builtin_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(workspace_ops::ReadFileTool));
    registry.register(Arc::new(workspace_ops::WriteFileTool));
    registry.register(Arc::new(workspace_ops::ListDirTool));
    registry.register(Arc::new(workspace_ops::MakeDirTool));
    registry.register(Arc::new(workspace_ops::DeletePathTool));
    registry.register(Arc::new(workspace_ops::GrepFilesTool));
    registry.register(Arc::new(exec::RunCommandTool::from_config(&config.exec)?));
    registry.register(Arc::new(dev_server::StartDevServerTool));
    registry.register(Arc::new(dev_server::DevServerStatusTool {
        tail_lines: config.dev_server.status_tail_lines,
    }));
    registry.register(Arc::new(dev_server::StopDevServerTool {
        grace: std::time::Duration::from_secs(config.dev_server.stop_grace_sec),
    }));
    registry.register(Arc::new(decision::RecordDecisionTool));

    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;
    use std::sync::Arc;

    use mgx_context::AgentContext;
    use mgx_store::MemoryStore;

    /// A context pointing at a temp workspace, for driving tools in tests.
    pub fn test_context(workspace: &Path) -> Arc<AgentContext> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(AgentContext::new(
            "test-session",
            "ws-test",
            workspace,
            store.clone(),
            store,
        ))
    }
}
