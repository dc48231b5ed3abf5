//! The workflow-decision sentinel tool.
//!
//! Its only effect is to record the agent's next-action choice in its own
//! tool call; the graph orchestrator reads the decision back off the
//! assistant message. The result string just acknowledges the choice.

use serde_json::{json, Value};

use mgx_domain::{Decision, ToolDefinition};

use crate::{Tool, ToolOutcome};

pub const DECISION_TOOL_NAME: &str = "record_decision";

/// Extract a [`Decision`] from this tool's call arguments.
pub fn decision_from_args(args: &Value) -> Option<Decision> {
    args.get("next_action")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(Decision::new)
}

pub struct RecordDecisionTool;

#[async_trait::async_trait]
impl Tool for RecordDecisionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: DECISION_TOOL_NAME.into(),
            description: "Record your next-action choice for the workflow: \
                          'continue' to hand off to the next role, 'end' to finish the run, \
                          or a 'back_to_*' action to send work back."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "next_action": {
                        "type": "string",
                        "description": "One of: continue, end, or a back_to_* action valid for your role"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Short justification (optional)"
                    }
                },
                "required": ["next_action"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> ToolOutcome {
        match decision_from_args(&args) {
            Some(decision) => {
                ToolOutcome::json(json!({ "recorded": decision.next_action }))
            }
            None => ToolOutcome::error("missing required argument: next_action"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_next_action() {
        let outcome = RecordDecisionTool
            .invoke(json!({ "next_action": "back_to_pm" }))
            .await;
        assert!(!outcome.is_error);
        assert!(outcome.content.contains("back_to_pm"));
    }

    #[tokio::test]
    async fn missing_action_is_error() {
        let outcome = RecordDecisionTool.invoke(json!({})).await;
        assert!(outcome.is_error);
    }

    #[test]
    fn decision_extraction() {
        assert_eq!(
            decision_from_args(&json!({ "next_action": "end" })),
            Some(Decision::new("end"))
        );
        assert_eq!(decision_from_args(&json!({ "next_action": "" })), None);
        assert_eq!(decision_from_args(&json!({ "reason": "done" })), None);
    }
}
