use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Auth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWKS endpoint for bearer-token validation. `None` = dev mode
    /// (every request resolves to `dev_subject`).
    #[serde(default)]
    pub jwks_url: Option<String>,
    /// Expected `iss` claim. Skipped when `None`.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected `aud` claim. Skipped when `None`.
    #[serde(default)]
    pub audience: Option<String>,
    /// Subject used when bearer auth is disabled.
    #[serde(default = "d_dev_subject")]
    pub dev_subject: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            issuer: None,
            audience: None,
            dev_subject: d_dev_subject(),
        }
    }
}

fn d_dev_subject() -> String {
    "dev-user".into()
}
