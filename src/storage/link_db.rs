// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded link database backed by redb (pure Rust, ACID).
//!
//! Single-row operations open their own redb transaction. Changes that
//! touch links and wallets together go through [`LinkTx`].

use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use uuid::Uuid;

use super::advisory::{AdvisoryLocks, LockKey};
use super::records::{AllowListEntry, Challenge, CustodianLink, WalletRecord};
use super::scoped::LinkTx;
use crate::providers::ProviderKind;

// =============================================================================
// Table Definitions
// =============================================================================

/// wallet_id → serialized WalletRecord (JSON bytes).
pub(super) const WALLETS: TableDefinition<&str, &[u8]> = TableDefinition::new("wallets");

/// `linking_id|custodian|wallet_id` → serialized CustodianLink.
/// Prefix scans by linking ID drive fan-in counts.
pub(super) const CUSTODIAN_LINKS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("custodian_links");

/// Index: `wallet_id|custodian|linking_id` → custodian_links key.
pub(super) const WALLET_LINKS: TableDefinition<&str, &str> = TableDefinition::new("wallet_links");

/// wallet_id → serialized Challenge.
const CHALLENGES: TableDefinition<&str, &[u8]> = TableDefinition::new("challenges");

/// wallet_id → serialized AllowListEntry.
const ALLOW_LIST: TableDefinition<&str, &[u8]> = TableDefinition::new("allow_list");

/// linking_id → number of extra fan-in slots granted.
const LINKING_LIMIT_ADJUST: TableDefinition<&str, u32> =
    TableDefinition::new("linking_limit_adjust");

/// bitFlyer request_id → unix seconds when consumed.
const BITFLYER_REQUEST_IDS: TableDefinition<&str, i64> =
    TableDefinition::new("bitflyer_request_ids");

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("fan-in limit of {max} reached for linking id {linking_id}")]
    FanInExceeded { linking_id: Uuid, max: usize },
}

pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// Key Helpers
// =============================================================================

pub(super) fn link_key(linking_id: Uuid, custodian: ProviderKind, wallet_id: Uuid) -> String {
    format!("{linking_id}|{custodian}|{wallet_id}")
}

pub(super) fn wallet_link_key(wallet_id: Uuid, custodian: ProviderKind, linking_id: Uuid) -> String {
    format!("{wallet_id}|{custodian}|{linking_id}")
}

/// Half-open string range covering every key that starts with `prefix`.
///
/// Prefixes always end in `|`; `}` is the next code point.
fn prefix_bounds(prefix: &str) -> (String, String) {
    let mut end = prefix.trim_end_matches('|').to_string();
    end.push('}');
    (prefix.to_string(), end)
}

/// Decode every link whose primary key starts with `prefix`.
pub(super) fn links_with_prefix<T>(links: &T, prefix: &str) -> StorageResult<Vec<CustodianLink>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = prefix_bounds(prefix);
    let mut out = Vec::new();
    for entry in links.range(start.as_str()..end.as_str())? {
        let (_, value) = entry?;
        out.push(serde_json::from_slice(value.value())?);
    }
    Ok(out)
}

/// Decode every link of a wallet via the wallet index.
pub(super) fn wallet_links_with_prefix<I, T>(
    index: &I,
    links: &T,
    prefix: &str,
) -> StorageResult<Vec<CustodianLink>>
where
    I: ReadableTable<&'static str, &'static str>,
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let (start, end) = prefix_bounds(prefix);
    let mut keys = Vec::new();
    for entry in index.range(start.as_str()..end.as_str())? {
        let (_, primary) = entry?;
        keys.push(primary.value().to_string());
    }

    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(value) = links.get(key.as_str())? {
            out.push(serde_json::from_slice(value.value())?);
        }
    }
    Ok(out)
}

/// Active links sharing (`linking_id`, `custodian`), across all wallets.
pub(super) fn active_links_in<T>(
    links: &T,
    linking_id: Uuid,
    custodian: ProviderKind,
) -> StorageResult<Vec<CustodianLink>>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let prefix = format!("{linking_id}|{custodian}|");
    Ok(links_with_prefix(links, &prefix)?
        .into_iter()
        .filter(CustodianLink::is_active)
        .collect())
}

// =============================================================================
// LinkDatabase
// =============================================================================

/// Embedded ACID store for all linking state.
pub struct LinkDatabase {
    pub(super) db: Database,
    locks: AdvisoryLocks,
}

impl LinkDatabase {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(WALLETS)?;
            let _ = write_txn.open_table(CUSTODIAN_LINKS)?;
            let _ = write_txn.open_table(WALLET_LINKS)?;
            let _ = write_txn.open_table(CHALLENGES)?;
            let _ = write_txn.open_table(ALLOW_LIST)?;
            let _ = write_txn.open_table(LINKING_LIMIT_ADJUST)?;
            let _ = write_txn.open_table(BITFLYER_REQUEST_IDS)?;
        }
        write_txn.commit()?;

        Ok(Self {
            db,
            locks: AdvisoryLocks::new(),
        })
    }

    /// Start a scoped transaction holding the advisory locks for `keys`.
    ///
    /// Locks are taken in the given order. Callers that take more than one
    /// lock always put `LockKey::Linking` before `LockKey::Wallet`.
    pub async fn begin(&self, keys: &[LockKey]) -> LinkTx<'_> {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.locks.acquire(*key).await);
        }
        LinkTx::new(self, guards)
    }

    pub fn locks(&self) -> &AdvisoryLocks {
        &self.locks
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Register a wallet. Fails if the ID is taken.
    pub fn insert_wallet(&self, wallet: &WalletRecord) -> StorageResult<()> {
        let key = wallet.id.to_string();
        let json = serde_json::to_vec(wallet)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(WALLETS)?;
            if table.get(key.as_str())?.is_some() {
                return Err(StorageError::AlreadyExists(format!("wallet {key}")));
            }
            table.insert(key.as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_wallet(&self, wallet_id: Uuid) -> StorageResult<Option<WalletRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(WALLETS)?;
        match table.get(wallet_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // Custodian Links
    // =========================================================================

    /// All link rows of a wallet, every custodian and state.
    pub fn links_for_wallet(&self, wallet_id: Uuid) -> StorageResult<Vec<CustodianLink>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_LINKS)?;
        let links = read_txn.open_table(CUSTODIAN_LINKS)?;
        wallet_links_with_prefix(&index, &links, &format!("{wallet_id}|"))
    }

    fn links_for_wallet_custodian(
        &self,
        wallet_id: Uuid,
        custodian: ProviderKind,
    ) -> StorageResult<Vec<CustodianLink>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(WALLET_LINKS)?;
        let links = read_txn.open_table(CUSTODIAN_LINKS)?;
        wallet_links_with_prefix(&index, &links, &format!("{wallet_id}|{custodian}|"))
    }

    /// The wallet's active link for `custodian`, if any.
    pub fn active_link(
        &self,
        wallet_id: Uuid,
        custodian: ProviderKind,
    ) -> StorageResult<Option<CustodianLink>> {
        Ok(self
            .links_for_wallet_custodian(wallet_id, custodian)?
            .into_iter()
            .find(CustodianLink::is_active))
    }

    /// Active links of the wallet across all custodians.
    pub fn active_links_for_wallet(&self, wallet_id: Uuid) -> StorageResult<Vec<CustodianLink>> {
        Ok(self
            .links_for_wallet(wallet_id)?
            .into_iter()
            .filter(CustodianLink::is_active)
            .collect())
    }

    /// Most recently disconnected link for wallet + custodian.
    pub fn latest_disconnected_link(
        &self,
        wallet_id: Uuid,
        custodian: ProviderKind,
    ) -> StorageResult<Option<CustodianLink>> {
        Ok(self
            .links_for_wallet_custodian(wallet_id, custodian)?
            .into_iter()
            .filter(|link| link.disconnected_at.is_some())
            .max_by_key(|link| link.disconnected_at))
    }

    /// Active links sharing (`linking_id`, `custodian`) across all wallets.
    pub fn active_links(
        &self,
        linking_id: Uuid,
        custodian: ProviderKind,
    ) -> StorageResult<Vec<CustodianLink>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(CUSTODIAN_LINKS)?;
        active_links_in(&links, linking_id, custodian)
    }

    pub fn count_active_links(&self, linking_id: Uuid, custodian: ProviderKind) -> StorageResult<usize> {
        Ok(self.active_links(linking_id, custodian)?.len())
    }

    /// Whether this wallet has ever been linked to `linking_id`, in any state.
    pub fn has_prior_linking(&self, wallet_id: Uuid, linking_id: Uuid) -> StorageResult<bool> {
        Ok(self
            .links_for_wallet(wallet_id)?
            .iter()
            .any(|link| link.linking_id == linking_id))
    }

    /// Latest full unlink of any wallet from `linking_id`.
    pub fn last_unlinked_at(&self, linking_id: Uuid) -> StorageResult<Option<DateTime<Utc>>> {
        let read_txn = self.db.begin_read()?;
        let links = read_txn.open_table(CUSTODIAN_LINKS)?;
        Ok(links_with_prefix(&links, &format!("{linking_id}|"))?
            .into_iter()
            .filter_map(|link| link.unlinked_at)
            .max())
    }

    // =========================================================================
    // Linking Limit Adjustments
    // =========================================================================

    pub fn linking_limit_adjustment(&self, linking_id: Uuid) -> StorageResult<u32> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(LINKING_LIMIT_ADJUST)?;
        Ok(table
            .get(linking_id.to_string().as_str())?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    /// Grant one more fan-in slot to `linking_id`. Returns the new adjustment.
    pub fn increase_linking_limit(&self, linking_id: Uuid) -> StorageResult<u32> {
        let key = linking_id.to_string();
        let write_txn = self.db.begin_write()?;
        let adjusted = {
            let mut table = write_txn.open_table(LINKING_LIMIT_ADJUST)?;
            let current = table.get(key.as_str())?.map(|v| v.value()).unwrap_or(0);
            let next = current.saturating_add(1);
            table.insert(key.as_str(), next)?;
            next
        };
        write_txn.commit()?;
        Ok(adjusted)
    }

    // =========================================================================
    // Challenges
    // =========================================================================

    /// Insert or replace the wallet's challenge.
    pub fn upsert_challenge(&self, challenge: &Challenge) -> StorageResult<()> {
        let json = serde_json::to_vec(challenge)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(CHALLENGES)?;
            table.insert(challenge.wallet_id.to_string().as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn get_challenge(&self, wallet_id: Uuid) -> StorageResult<Option<Challenge>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(CHALLENGES)?;
        match table.get(wallet_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    /// Remove and return the wallet's challenge if its nonce matches.
    ///
    /// Check and delete happen in one write transaction, so a nonce is
    /// handed out at most once.
    pub fn take_challenge(&self, wallet_id: Uuid, nonce: &str) -> StorageResult<Option<Challenge>> {
        let key = wallet_id.to_string();
        let write_txn = self.db.begin_write()?;
        let taken = {
            let mut table = write_txn.open_table(CHALLENGES)?;
            let existing: Option<Challenge> = match table.get(key.as_str())? {
                Some(value) => Some(serde_json::from_slice(value.value())?),
                None => None,
            };
            match existing {
                Some(challenge) if challenge.nonce == nonce => {
                    table.remove(key.as_str())?;
                    Some(challenge)
                }
                _ => None,
            }
        };
        write_txn.commit()?;
        Ok(taken)
    }

    /// Delete challenges created before `cutoff`. Returns how many were removed.
    pub fn sweep_challenges(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(CHALLENGES)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                let challenge: Challenge = serde_json::from_slice(value.value())?;
                if challenge.created_at < cutoff {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }

    // =========================================================================
    // Allow List
    // =========================================================================

    pub fn insert_allow_list(&self, wallet_id: Uuid) -> StorageResult<AllowListEntry> {
        let entry = AllowListEntry {
            wallet_id,
            created_at: Utc::now(),
        };
        let json = serde_json::to_vec(&entry)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(ALLOW_LIST)?;
            table.insert(wallet_id.to_string().as_str(), json.as_slice())?;
        }
        write_txn.commit()?;
        Ok(entry)
    }

    pub fn get_allow_list(&self, wallet_id: Uuid) -> StorageResult<Option<AllowListEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALLOW_LIST)?;
        match table.get(wallet_id.to_string().as_str())? {
            Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
            None => Ok(None),
        }
    }

    // =========================================================================
    // bitFlyer Request IDs
    // =========================================================================

    /// Record `request_id` as consumed. Returns `false` if it already was.
    pub fn consume_request_id(&self, request_id: &str, now: DateTime<Utc>) -> StorageResult<bool> {
        let write_txn = self.db.begin_write()?;
        let fresh = {
            let mut table = write_txn.open_table(BITFLYER_REQUEST_IDS)?;
            if table.get(request_id)?.is_some() {
                false
            } else {
                table.insert(request_id, now.timestamp())?;
                true
            }
        };
        write_txn.commit()?;
        Ok(fresh)
    }

    /// Forget request IDs consumed before `cutoff`.
    pub fn sweep_request_ids(&self, cutoff: DateTime<Utc>) -> StorageResult<usize> {
        let cutoff = cutoff.timestamp();
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(BITFLYER_REQUEST_IDS)?;
            let mut stale = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                if value.value() < cutoff {
                    stale.push(key.value().to_string());
                }
            }
            for key in &stale {
                table.remove(key.as_str())?;
            }
            stale.len()
        };
        write_txn.commit()?;
        Ok(removed)
    }
}
