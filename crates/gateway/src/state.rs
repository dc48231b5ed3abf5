use std::sync::Arc;

use mgx_domain::config::Config;
use mgx_store::SharedStore;

use crate::auth::AuthVerifier;
use crate::session_lock::SessionLockMap;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: SharedStore,
    pub auth: Arc<AuthVerifier>,
    /// Per-session generate locks (one live stream producer at a time).
    pub session_locks: Arc<SessionLockMap>,
}

impl AppState {
    pub fn new(config: Arc<Config>, store: SharedStore, auth: Arc<AuthVerifier>) -> Self {
        Self {
            config,
            store,
            auth,
            session_locks: Arc::new(SessionLockMap::new()),
        }
    }
}
