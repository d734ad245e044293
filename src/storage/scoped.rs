// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scoped link transaction.
//!
//! A [`LinkTx`] owns the advisory locks of one Link/Disconnect/Unlink call.
//! Reads see committed state; writes are buffered and applied by
//! [`LinkTx::commit`] in a single redb write transaction. Dropping the
//! transaction without committing discards every buffered write and
//! releases the locks.
//!
//! Fan-in bounds registered with [`LinkTx::require_fan_in_below`] are
//! re-checked inside the write transaction before anything is written.

use redb::ReadableTable;
use tracing::debug;
use uuid::Uuid;

use super::advisory::AdvisoryGuard;
use super::link_db::{
    active_links_in, link_key, wallet_link_key, LinkDatabase, StorageError, StorageResult,
    CUSTODIAN_LINKS, WALLETS, WALLET_LINKS,
};
use super::records::{CustodianLink, WalletLinking, WalletRecord};
use crate::providers::ProviderKind;

enum TxOp {
    PutLink(CustodianLink),
    SetWalletLinking {
        wallet_id: Uuid,
        linking: Option<WalletLinking>,
    },
}

struct FanInBound {
    linking_id: Uuid,
    custodian: ProviderKind,
    wallet_id: Uuid,
    max: usize,
}

pub struct LinkTx<'db> {
    db: &'db LinkDatabase,
    guards: Vec<AdvisoryGuard>,
    ops: Vec<TxOp>,
    bounds: Vec<FanInBound>,
    committed: bool,
}

impl<'db> LinkTx<'db> {
    pub(super) fn new(db: &'db LinkDatabase, guards: Vec<AdvisoryGuard>) -> Self {
        Self {
            db,
            guards,
            ops: Vec::new(),
            bounds: Vec::new(),
            committed: false,
        }
    }

    /// Committed state, for reads made while the locks are held.
    pub fn db(&self) -> &'db LinkDatabase {
        self.db
    }

    /// Insert or replace a link row.
    pub fn put_link(&mut self, link: CustodianLink) {
        self.ops.push(TxOp::PutLink(link));
    }

    /// Overwrite the wallet's linking fields; `None` clears them.
    pub fn set_wallet_linking(&mut self, wallet_id: Uuid, linking: Option<WalletLinking>) {
        self.ops.push(TxOp::SetWalletLinking { wallet_id, linking });
    }

    /// Abort the commit if (`linking_id`, `custodian`) already has `max`
    /// active links held by wallets other than `wallet_id`.
    pub fn require_fan_in_below(
        &mut self,
        linking_id: Uuid,
        custodian: ProviderKind,
        wallet_id: Uuid,
        max: usize,
    ) {
        self.bounds.push(FanInBound {
            linking_id,
            custodian,
            wallet_id,
            max,
        });
    }

    /// Apply every buffered write atomically, then release the locks.
    pub fn commit(mut self) -> StorageResult<()> {
        let ops = std::mem::take(&mut self.ops);
        let bounds = std::mem::take(&mut self.bounds);

        let write_txn = self.db.db.begin_write()?;
        {
            let mut links = write_txn.open_table(CUSTODIAN_LINKS)?;
            let mut index = write_txn.open_table(WALLET_LINKS)?;
            let mut wallets = write_txn.open_table(WALLETS)?;

            for bound in &bounds {
                let held = active_links_in(&links, bound.linking_id, bound.custodian)?
                    .into_iter()
                    .filter(|link| link.wallet_id != bound.wallet_id)
                    .count();
                if held >= bound.max {
                    return Err(StorageError::FanInExceeded {
                        linking_id: bound.linking_id,
                        max: bound.max,
                    });
                }
            }

            for op in ops {
                match op {
                    TxOp::PutLink(link) => {
                        let key = link_key(link.linking_id, link.custodian, link.wallet_id);
                        let index_key =
                            wallet_link_key(link.wallet_id, link.custodian, link.linking_id);
                        let json = serde_json::to_vec(&link)?;
                        links.insert(key.as_str(), json.as_slice())?;
                        index.insert(index_key.as_str(), key.as_str())?;
                    }
                    TxOp::SetWalletLinking { wallet_id, linking } => {
                        let key = wallet_id.to_string();
                        let mut wallet: WalletRecord = match wallets.get(key.as_str())? {
                            Some(value) => serde_json::from_slice(value.value())?,
                            None => return Err(StorageError::NotFound(format!("wallet {key}"))),
                        };
                        wallet.apply_linking(linking.as_ref());
                        let json = serde_json::to_vec(&wallet)?;
                        wallets.insert(key.as_str(), json.as_slice())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for LinkTx<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.ops.is_empty() {
            debug!(
                pending = self.ops.len(),
                locks = ?self.guards.iter().map(AdvisoryGuard::key).collect::<Vec<_>>(),
                "link transaction rolled back"
            );
        }
    }
}
