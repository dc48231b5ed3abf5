//! Decision extraction — two channels, tool call preferred.
//!
//! The structured channel is the workflow-decision tool call captured by
//! the agent loop. The legacy channel is a delimited marker embedded in
//! the node's final text: `<next_action>VALUE</next_action>`. When neither
//! is present the node continues to its linear successor.

use mgx_agents::AgentOutcome;
use mgx_domain::Decision;

/// Which channel produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionChannel {
    Tool,
    Marker,
    Default,
}

fn marker_regex() -> &'static regex::Regex {
    static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"<next_action>\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*</next_action>")
            .expect("marker regex is valid")
    })
}

/// Scan the node's output for its routing decision.
pub fn extract_decision(outcome: &AgentOutcome) -> (Decision, DecisionChannel) {
    if let Some(decision) = &outcome.decision {
        return (decision.clone(), DecisionChannel::Tool);
    }
    if let Some(caps) = marker_regex().captures(&outcome.final_text) {
        return (Decision::new(&caps[1]), DecisionChannel::Marker);
    }
    (Decision::continue_(), DecisionChannel::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_domain::Usage;

    fn outcome(text: &str, decision: Option<Decision>) -> AgentOutcome {
        AgentOutcome {
            final_text: text.into(),
            decision,
            appended: Vec::new(),
            usage: Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
                total_tokens: 0,
            },
        }
    }

    #[test]
    fn tool_channel_wins_over_marker() {
        let o = outcome(
            "done <next_action>end</next_action>",
            Some(Decision::new("back_to_pm")),
        );
        let (d, ch) = extract_decision(&o);
        assert_eq!(d.next_action, "back_to_pm");
        assert_eq!(ch, DecisionChannel::Tool);
    }

    #[test]
    fn marker_is_the_fallback() {
        let o = outcome("all finished.\n<next_action>end</next_action>\n", None);
        let (d, ch) = extract_decision(&o);
        assert_eq!(d.next_action, "end");
        assert_eq!(ch, DecisionChannel::Marker);
    }

    #[test]
    fn marker_tolerates_whitespace() {
        let o = outcome("<next_action>  continue_development </next_action>", None);
        let (d, _) = extract_decision(&o);
        assert_eq!(d.next_action, "continue_development");
    }

    #[test]
    fn no_channel_defaults_to_continue() {
        let o = outcome("plain answer with no routing", None);
        let (d, ch) = extract_decision(&o);
        assert_eq!(d.next_action, "continue");
        assert_eq!(ch, DecisionChannel::Default);
    }

    #[test]
    fn malformed_marker_is_ignored() {
        let o = outcome("<next_action></next_action>", None);
        let (_, ch) = extract_decision(&o);
        assert_eq!(ch, DecisionChannel::Default);
    }
}
