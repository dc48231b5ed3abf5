//! Team state — the shared blackboard passed between graph nodes.
//!
//! Lives for the duration of one graph execution and is discarded on
//! `finish`. Durable state lives in the stores, never here.

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::session::Framework;

/// Workflow stage of the team, advanced as nodes complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Requirements,
    ProductDefinition,
    Design,
    Planning,
    Development,
    Testing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Requirements => "requirements",
            Stage::ProductDefinition => "product_definition",
            Stage::Design => "design",
            Stage::Planning => "planning",
            Stage::Development => "development",
            Stage::Testing => "testing",
            Stage::Done => "done",
        }
    }
}

/// The structured next-action choice a node makes to steer routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub next_action: String,
}

impl Decision {
    pub const CONTINUE: &'static str = "continue";
    pub const END: &'static str = "end";

    pub fn new(next_action: impl Into<String>) -> Self {
        Self {
            next_action: next_action.into(),
        }
    }

    pub fn continue_() -> Self {
        Self::new(Self::CONTINUE)
    }

    pub fn is_end(&self) -> bool {
        self.next_action == Self::END
    }
}

/// The well-known documents a team produces into the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Requirements,
    Prd,
    Design,
    Tasks,
    TestReport,
}

impl DocumentKind {
    /// Workspace-relative file name the document is written to.
    pub fn file_name(&self) -> &'static str {
        match self {
            DocumentKind::Requirements => "requirements.md",
            DocumentKind::Prd => "prd.md",
            DocumentKind::Design => "design.md",
            DocumentKind::Tasks => "tasks.md",
            DocumentKind::TestReport => "test_report.md",
        }
    }
}

/// Per-role document slots, optionally populated as agents work.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSlots {
    pub requirements: Option<String>,
    pub prd: Option<String>,
    pub design: Option<String>,
    pub tasks: Option<String>,
    pub test_report: Option<String>,
}

impl DocumentSlots {
    pub fn set(&mut self, kind: DocumentKind, content: String) {
        let slot = match kind {
            DocumentKind::Requirements => &mut self.requirements,
            DocumentKind::Prd => &mut self.prd,
            DocumentKind::Design => &mut self.design,
            DocumentKind::Tasks => &mut self.tasks,
            DocumentKind::TestReport => &mut self.test_report,
        };
        *slot = Some(content);
    }

    pub fn get(&self, kind: DocumentKind) -> Option<&str> {
        match kind {
            DocumentKind::Requirements => self.requirements.as_deref(),
            DocumentKind::Prd => self.prd.as_deref(),
            DocumentKind::Design => self.design.as_deref(),
            DocumentKind::Tasks => self.tasks.as_deref(),
            DocumentKind::TestReport => self.test_report.as_deref(),
        }
    }
}

/// The shared blackboard for one run.
#[derive(Debug, Clone)]
pub struct TeamState {
    /// Running message list, append-only within one run.
    pub messages: Vec<ChatMessage>,
    pub stage: Stage,
    pub framework: Framework,
    pub workspace_id: String,
    pub documents: DocumentSlots,
    /// Count of node transitions taken so far.
    pub iteration: u32,
    pub last_decision: Option<Decision>,
}

impl TeamState {
    pub fn new(framework: Framework, workspace_id: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            stage: Stage::Requirements,
            framework,
            workspace_id: workspace_id.into(),
            documents: DocumentSlots::default(),
            iteration: 0,
            last_decision: None,
        }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }
}
