use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use uuid::Uuid;

use crate::models::Account;

/// Cache hit/miss statistics for monitoring.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits();
        let total = hits + self.misses();
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// In-process write-through cache for account-by-id lookups.
///
/// Mutating paths update the cache synchronously with the commit that
/// changed the account, so a read following a movement in the same causal
/// chain never observes a stale balance. Never consulted for balance
/// checks; those happen inside the store's atomic unit.
#[derive(Debug, Default)]
pub struct AccountCache {
    entries: RwLock<HashMap<Uuid, Account>>,
    stats: CacheStats,
}

impl AccountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<Account> {
        let found = self
            .entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&id).cloned());
        match found {
            Some(account) => {
                self.stats.record_hit();
                Some(account)
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Write-through update: called with post-commit account state.
    ///
    /// Keeps the fresher of the cached and incoming snapshots, compared by
    /// `updated_at`. A read-miss fill that raced a concurrent movement
    /// carries the pre-commit timestamp and loses to the write-through
    /// entry the movement already put here.
    pub fn put(&self, account: Account) {
        if let Ok(mut entries) = self.entries.write() {
            match entries.entry(account.id) {
                Entry::Occupied(mut cached) => {
                    if account.updated_at >= cached.get().updated_at {
                        cached.insert(account);
                        self.stats.record_write();
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(account);
                    self.stats.record_write();
                }
            }
        }
    }

    pub fn remove(&self, id: Uuid) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&id);
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }
}
