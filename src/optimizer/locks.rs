//! Per-identity serialization.
//!
//! The backup/restore commit is not safe against itself, so two
//! optimizations of the same image must never interleave. Different
//! identities proceed in parallel.

use crate::attachment::ImageIdentity;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<ImageIdentity, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `identity`.
    pub async fn lock(&self, identity: &ImageIdentity) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // entries only the map refers to are neither held nor awaited
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(identity.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
