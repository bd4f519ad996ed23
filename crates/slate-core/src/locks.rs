//! Per-user mutual exclusion
//!
//! Every mutation of a user's entitlement row, including the sweeper's final
//! delete, happens while holding that user's guard.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-user async mutexes
#[derive(Clone, Default)]
pub struct UserLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Proof that the holder owns a user's lock
pub struct UserGuard {
    user_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    /// User this guard serializes
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn covers(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

impl std::fmt::Debug for UserGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserGuard")
            .field("user_id", &self.user_id)
            .finish()
    }
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of `user_id`
    pub async fn lock(&self, user_id: &str) -> UserGuard {
        let mutex = self
            .inner
            .entry(user_id.to_string())
            .or_default()
            .value()
            .clone();

        UserGuard {
            user_id: user_id.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    /// Drop entries nobody holds or waits on
    pub fn prune(&self) {
        self.inner.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    /// Number of tracked users
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl std::fmt::Debug for UserLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserLocks")
            .field("tracked", &self.inner.len())
            .finish()
    }
}
