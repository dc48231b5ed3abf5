mod auth;
mod broker;
mod compaction;
mod llm;
mod orchestrator;
mod server;
mod store;
mod team;
mod tools;
mod workspace;

pub use auth::*;
pub use broker::*;
pub use compaction::*;
pub use llm::*;
pub use orchestrator::*;
pub use server::*;
pub use store::*;
pub use team::*;
pub use tools::*;
pub use workspace::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub team: TeamConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

impl Config {
    /// Load a TOML config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    /// Validate the configuration, returning every issue found.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.server.sse.poll_ms == 0 {
            issues.push(ConfigIssue::error("server.sse.poll_ms", "must be > 0"));
        }
        if self.server.sse.batch_size == 0 {
            issues.push(ConfigIssue::error("server.sse.batch_size", "must be > 0"));
        }
        if self.store.event_ttl_sec == 0 {
            issues.push(ConfigIssue::error("store.event_ttl_sec", "must be > 0"));
        }
        if self.store.message_ttl_sec < self.store.event_ttl_sec {
            issues.push(ConfigIssue::warning(
                "store.message_ttl_sec",
                "messages expire before events; history may outlive its conversation",
            ));
        }
        if self.team.max_transitions == 0 {
            issues.push(ConfigIssue::error("team.max_transitions", "must be > 0"));
        }
        if self.orchestrator.task_timeout_sec < 60 {
            issues.push(ConfigIssue::warning(
                "orchestrator.task_timeout_sec",
                "below 60s; runs will rarely complete",
            ));
        }
        if self.llm.providers.is_empty() {
            issues.push(ConfigIssue::warning(
                "llm.providers",
                "no LLM providers configured; runs will fail at the first model call",
            ));
        }
        if self.auth.jwks_url.is_none() {
            issues.push(ConfigIssue::warning(
                "auth.jwks_url",
                "bearer auth disabled; all requests resolve to the dev subject",
            ));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: &str) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_errors() {
        let config = Config::default();
        let errors: Vec<_> = config
            .validate()
            .into_iter()
            .filter(|i| i.severity == ConfigSeverity::Error)
            .collect();
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn zero_poll_interval_is_an_error() {
        let mut config = Config::default();
        config.server.sse.poll_ms = 0;
        assert!(config
            .validate()
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.field == "server.sse.poll_ms"));
    }

    #[test]
    fn short_message_ttl_warns() {
        let mut config = Config::default();
        config.store.message_ttl_sec = 60;
        assert!(config
            .validate()
            .iter()
            .any(|i| i.field == "store.message_ttl_sec"));
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [server]
            port = 9000

            [orchestrator]
            image = "mgx-agent:dev"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.orchestrator.image, "mgx-agent:dev");
        // Untouched sections keep defaults.
        assert_eq!(config.server.sse.poll_ms, 500);
        assert_eq!(config.store.event_ttl_sec, 7 * 24 * 3600);
    }
}
