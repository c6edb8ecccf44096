//! Per-album async lock table
//!
//! Serializes the load-plan-apply cycle of callers sharing one
//! [`MembershipService`](crate::membership::MembershipService). Locks are
//! keyed by album id, so work on different albums never waits on each other.
//! Cross-process writers are still caught by the store's version check.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which idle entries are dropped on the next acquire
const PRUNE_THRESHOLD: usize = 64;

/// Keyed lock table, one async mutex per album
#[derive(Debug, Default, Clone)]
pub struct AlbumLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

/// Held album lock; released on drop
#[derive(Debug)]
pub struct AlbumLockGuard {
    album_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl AlbumLockGuard {
    pub fn album_id(&self) -> &str {
        &self.album_id
    }
}

impl AlbumLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one album
    pub async fn acquire(&self, album_id: &str) -> AlbumLockGuard {
        let album_lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() >= PRUNE_THRESHOLD {
                prune_idle(&mut locks);
            }
            locks
                .entry(album_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        AlbumLockGuard {
            album_id: album_id.to_string(),
            _guard: album_lock.lock_owned().await,
        }
    }

    /// Drop entries nobody holds or waits on
    pub async fn prune(&self) {
        prune_idle(&mut *self.locks.lock().await);
    }

    /// Number of albums currently tracked
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

// An entry referenced only by the map has no holder and no waiter.
fn prune_idle(locks: &mut HashMap<String, Arc<Mutex<()>>>) {
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
}
