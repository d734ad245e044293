// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keyed advisory locks.
//!
//! A lock is identified by a 64-bit hash of an application key. Holders of
//! the same hash are serialized; unrelated keys never wait on each other.
//! Hash collisions only cause extra serialization.
//!
//! Slots are created on demand and dropped once the last guard goes away.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Application key for an advisory lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKey {
    /// Serializes every attempt to link one external account.
    Linking(Uuid),
    /// Serializes linking-state changes of one wallet.
    Wallet(Uuid),
}

impl LockKey {
    /// 64-bit lock id, the first eight bytes of SHA-256 over the tagged key.
    pub fn hash(&self) -> u64 {
        let mut hasher = Sha256::new();
        match self {
            LockKey::Linking(id) => {
                hasher.update(b"linking:");
                hasher.update(id.as_bytes());
            }
            LockKey::Wallet(id) => {
                hasher.update(b"wallet:");
                hasher.update(id.as_bytes());
            }
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes)
    }
}

/// Held advisory lock; released on drop.
#[derive(Debug)]
pub struct AdvisoryGuard {
    key: u64,
    _guard: OwnedMutexGuard<()>,
}

impl AdvisoryGuard {
    pub fn key(&self) -> u64 {
        self.key
    }
}

/// Registry of advisory lock slots.
#[derive(Debug, Default)]
pub struct AdvisoryLocks {
    slots: Mutex<HashMap<u64, Weak<AsyncMutex<()>>>>,
}

impl AdvisoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock for `key`.
    pub async fn acquire(&self, key: LockKey) -> AdvisoryGuard {
        let hash = key.hash();
        let slot = self.slot(hash);
        let guard = slot.lock_owned().await;
        debug!(lock = hash, ?key, "advisory lock acquired");
        AdvisoryGuard { key: hash, _guard: guard }
    }

    /// Number of slots currently referenced by a holder or waiter.
    pub fn live_slots(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.values().filter(|w| w.strong_count() > 0).count()
    }

    fn slot(&self, hash: u64) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.retain(|_, weak| weak.strong_count() > 0);
        if let Some(existing) = slots.get(&hash).and_then(Weak::upgrade) {
            return existing;
        }
        let slot = Arc::new(AsyncMutex::new(()));
        slots.insert(hash, Arc::downgrade(&slot));
        slot
    }
}
