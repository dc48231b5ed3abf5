//! Per-session generate locks.
//!
//! A second `generate` while one is live gets an immediate busy rejection
//! rather than queueing. The permit is held by the SSE response stream and
//! releases when the stream closes.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Try to take the session's generate lock without waiting.
    pub fn try_acquire(&self, session_id: &str) -> Result<OwnedSemaphorePermit, SessionBusy> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().map_err(|_| SessionBusy)
    }

    /// Number of tracked sessions (for monitoring).
    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop semaphores no one currently holds.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

/// A generate stream is already live for this session.
#[derive(Debug)]
pub struct SessionBusy;

impl std::fmt::Display for SessionBusy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "a generation is already in progress for this session")
    }
}

impl std::error::Error for SessionBusy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_until_released() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("s1").unwrap();
        assert!(map.try_acquire("s1").is_err());
        drop(permit);
        assert!(map.try_acquire("s1").is_ok());
    }

    #[test]
    fn sessions_are_independent() {
        let map = SessionLockMap::new();
        let _a = map.try_acquire("s1").unwrap();
        let _b = map.try_acquire("s2").unwrap();
        assert_eq!(map.session_count(), 2);
    }

    #[test]
    fn prune_keeps_held_locks() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("held").unwrap();
        let released = map.try_acquire("released").unwrap();
        drop(released);

        map.prune_idle();
        assert_eq!(map.session_count(), 1);
        drop(permit);
        map.prune_idle();
        assert_eq!(map.session_count(), 0);
    }
}
