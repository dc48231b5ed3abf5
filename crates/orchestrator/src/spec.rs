//! Container spec construction.

use mgx_domain::config::{OrchestratorConfig, WorkspaceConfig};
use mgx_domain::Session;

/// Canonical workspace mount point inside the agent container.
pub const CONTAINER_WORKSPACE: &str = "/workspace";

/// Everything needed to create one agent container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Deterministic name derived from the session id.
    pub name: String,
    pub image: String,
    pub env: Vec<String>,
    /// Bind mounts in `host:container` form. The host side must be a host
    /// path — not a path inside the orchestrator's own container.
    pub binds: Vec<String>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
}

impl ContainerSpec {
    pub fn build(
        orchestrator: &OrchestratorConfig,
        workspace: &WorkspaceConfig,
        session: &Session,
        database_url: &str,
    ) -> Self {
        let host_path = workspace.host_path_for(&session.workspace_id);

        let mut env = vec![
            format!("SESSION_ID={}", session.id),
            format!("WORKSPACE_ID={}", session.workspace_id),
            format!("WORKSPACE_PATH={CONTAINER_WORKSPACE}"),
            format!("FRAMEWORK={}", session.framework),
            "RUN_MODE=database".to_string(),
            format!("MGX_DATABASE_URL={database_url}"),
            // Peer credential: the container authenticates callbacks with
            // its own session id.
            format!("MGX_AGENT_API_KEY={}", session.id),
        ];
        for var in &orchestrator.passthrough_env {
            if let Ok(value) = std::env::var(var) {
                env.push(format!("{var}={value}"));
            }
        }

        Self {
            name: container_name(&session.id),
            image: orchestrator.image.clone(),
            env,
            binds: vec![format!(
                "{}:{CONTAINER_WORKSPACE}",
                host_path.display()
            )],
            memory_bytes: orchestrator.memory_bytes,
            nano_cpus: orchestrator.nano_cpus,
        }
    }
}

/// The deterministic container name for a session.
pub fn container_name(session_id: &str) -> String {
    format!("mgx-agent-{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgx_domain::Framework;
    use std::path::PathBuf;

    fn session() -> Session {
        let mut s = Session::new("todo", Framework::Nextjs, "u1");
        s.id = "sess-1".into();
        s.workspace_id = "ws-1".into();
        s
    }

    #[test]
    fn name_is_deterministic() {
        assert_eq!(container_name("sess-1"), "mgx-agent-sess-1");
    }

    #[test]
    fn bind_uses_host_root_when_configured() {
        let workspace = WorkspaceConfig {
            root: PathBuf::from("/inside/container/workspaces"),
            host_root: Some(PathBuf::from("/srv/mgx/workspaces")),
        };
        let spec = ContainerSpec::build(
            &OrchestratorConfig::default(),
            &workspace,
            &session(),
            "sqlite://db",
        );
        assert_eq!(spec.binds, vec!["/srv/mgx/workspaces/ws-1:/workspace"]);
    }

    #[test]
    fn env_block_is_complete() {
        let spec = ContainerSpec::build(
            &OrchestratorConfig::default(),
            &WorkspaceConfig::default(),
            &session(),
            "sqlite://db",
        );
        for expected in [
            "SESSION_ID=sess-1",
            "WORKSPACE_ID=ws-1",
            "WORKSPACE_PATH=/workspace",
            "FRAMEWORK=nextjs",
            "RUN_MODE=database",
            "MGX_DATABASE_URL=sqlite://db",
            "MGX_AGENT_API_KEY=sess-1",
        ] {
            assert!(spec.env.iter().any(|e| e == expected), "missing {expected}");
        }
    }

    #[test]
    fn resource_caps_default_to_two_gib_one_core() {
        let spec = ContainerSpec::build(
            &OrchestratorConfig::default(),
            &WorkspaceConfig::default(),
            &session(),
            "sqlite://db",
        );
        assert_eq!(spec.memory_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(spec.nano_cpus, 1_000_000_000);
    }
}
