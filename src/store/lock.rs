//! Per-week locking.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::week::WeekKey;

/// One async mutex per week key.
///
/// Scheduler and command handlers take the week's lock before reading state
/// and keep it until the outbound message is sent.
#[derive(Debug, Default)]
pub struct WeekLocks {
    locks: Mutex<HashMap<WeekKey, Arc<AsyncMutex<()>>>>,
}

impl WeekLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and acquire the lock for `key`. Released when the guard drops.
    pub async fn lock(&self, key: WeekKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop idle locks of other weeks.
            locks.retain(|k, l| *k == key || Arc::strong_count(l) > 1);
            locks.entry(key).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        tracing::debug!("Acquired week lock: {}", key);
        guard
    }

    /// Number of weeks currently tracked.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
