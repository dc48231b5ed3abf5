//! Session records — the identity of a user/app pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target application framework for generated apps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Framework {
    #[serde(rename = "nextjs")]
    Nextjs,
    #[serde(rename = "fastapi-vite")]
    FastapiVite,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Framework::Nextjs => "nextjs",
            Framework::FastapiVite => "fastapi-vite",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "nextjs" => Some(Framework::Nextjs),
            "fastapi-vite" => Some(Framework::FastapiVite),
            _ => None,
        }
    }
}

impl std::fmt::Display for Framework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session binding a user to an app workspace.
///
/// Created on the first request for an app; `is_running` is flipped only by
/// the task orchestrator; sessions are never destroyed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub framework: Framework,
    pub workspace_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_running: bool,
}

impl Session {
    pub fn new(
        name: impl Into<String>,
        framework: Framework,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            workspace_id: format!("ws-{id}"),
            id,
            name: name.into(),
            framework,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
            is_running: false,
        }
    }
}
