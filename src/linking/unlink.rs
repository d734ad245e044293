// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Disconnect and unlink.
//!
//! *Disconnect* is the wallet owner stepping away from its custodian. The
//! link is marked disconnected and stops counting against the account's
//! fan-in right away. *Unlink* is the operator action that retires a link
//! for good; it is rate limited per external account.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::LinkError;
use crate::config::LinkingConfig;
use crate::providers::ProviderKind;
use crate::storage::{CustodianLink, LinkDatabase, LockKey};

pub struct UnlinkCoordinator {
    db: Arc<LinkDatabase>,
    config: Arc<LinkingConfig>,
}

impl UnlinkCoordinator {
    pub fn new(db: Arc<LinkDatabase>, config: Arc<LinkingConfig>) -> Self {
        Self { db, config }
    }

    /// Disconnect every active link of the wallet and clear its linking fields.
    ///
    /// Returns how many links were disconnected; zero is not an error.
    pub async fn disconnect(&self, wallet_id: Uuid) -> Result<usize, LinkError> {
        let mut tx = self.db.begin(&[LockKey::Wallet(wallet_id)]).await;
        let db = tx.db();
        if db.get_wallet(wallet_id)?.is_none() {
            return Err(LinkError::WalletNotFound(wallet_id));
        }

        let now = Utc::now();
        let active = db.active_links_for_wallet(wallet_id)?;
        let disconnected = active.len();
        for link in active {
            info!(
                %wallet_id,
                custodian = %link.custodian,
                linking_id = %link.linking_id,
                country = %link.country,
                "disconnecting link"
            );
            tx.put_link(CustodianLink {
                disconnected_at: Some(now),
                ..link
            });
        }
        tx.set_wallet_linking(wallet_id, None);
        tx.commit()?;
        Ok(disconnected)
    }

    /// Unlink the wallet's active `custodian` link, releasing its fan-in slot.
    pub async fn unlink(&self, wallet_id: Uuid, custodian: ProviderKind) -> Result<(), LinkError> {
        let linking_id = self
            .db
            .active_link(wallet_id, custodian)?
            .ok_or(LinkError::NoActiveLink(custodian))?
            .linking_id;

        let mut tx = self
            .db
            .begin(&[LockKey::Linking(linking_id), LockKey::Wallet(wallet_id)])
            .await;
        let db = tx.db();

        // The link may have changed while waiting for the locks.
        let link = db
            .active_link(wallet_id, custodian)?
            .filter(|link| link.linking_id == linking_id)
            .ok_or(LinkError::NoActiveLink(custodian))?;

        let now = Utc::now();
        if let Some(last) = db.last_unlinked_at(linking_id)? {
            if now - last < self.config.unlink_cooldown {
                return Err(LinkError::UnlinkingsExceeded);
            }
        }

        tx.put_link(CustodianLink {
            unlinked_at: Some(now),
            ..link
        });
        let wallet = db
            .get_wallet(wallet_id)?
            .ok_or(LinkError::WalletNotFound(wallet_id))?;
        if wallet.provider_linking_id == Some(linking_id) {
            tx.set_wallet_linking(wallet_id, None);
        }
        tx.commit()?;

        info!(%wallet_id, %custodian, %linking_id, "wallet unlinked");
        Ok(())
    }
}
