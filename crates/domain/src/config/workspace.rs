use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workspace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory that contains one subdirectory per workspace id, as seen
    /// by this process.
    #[serde(default = "d_root")]
    pub root: PathBuf,
    /// The same directory as seen by the Docker host. Container bind mounts
    /// must use host paths, not paths inside the orchestrator's own
    /// container; `None` means `root` already is a host path.
    #[serde(default)]
    pub host_root: Option<PathBuf>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: d_root(),
            host_root: None,
        }
    }
}

impl WorkspaceConfig {
    /// Path of a workspace as seen by this process.
    pub fn path_for(&self, workspace_id: &str) -> PathBuf {
        self.root.join(workspace_id)
    }

    /// Path of a workspace as seen by the Docker host (for bind mounts).
    pub fn host_path_for(&self, workspace_id: &str) -> PathBuf {
        self.host_root
            .as_deref()
            .unwrap_or(&self.root)
            .join(workspace_id)
    }
}

fn d_root() -> PathBuf {
    PathBuf::from("data/workspaces")
}
