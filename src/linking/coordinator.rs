// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Linking Coordinator
//!
//! Commits a verified custodian account onto a wallet. Every attempt runs
//! inside one [`LinkTx`] holding the advisory lock of the external account
//! (`LockKey::Linking`) and of the wallet (`LockKey::Wallet`), in that order.
//!
//! While the linking lock is held no other attempt can change the number of
//! wallets linked to the account, so the fan-in check and the insert act as
//! one step. The bound is checked again inside the redb write transaction.
//!
//! ## Steps
//!
//! 1. Lock the linking id, then the wallet.
//! 2. Load the wallet's active link for the custodian. Same linking id means
//!    re-authentication: skip steps 3 and 4.
//! 3. Region reset: reject a different country within the cooldown of the
//!    last disconnection.
//! 4. Fan-in: reject when the account is at its limit.
//! 5. Reputation verdict.
//! 6. Upsert the link row, disconnect the wallet's other active links and
//!    write the wallet's linking fields.
//! 7. Commit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::LinkError;
use crate::clients::ReputationClient;
use crate::config::LinkingConfig;
use crate::providers::{ProviderKind, VerifiedAccount};
use crate::storage::{CustodianLink, LinkDatabase, LockKey, WalletLinking};

/// A verified account to link onto a wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRequest {
    pub wallet_id: Uuid,
    pub custodian: ProviderKind,
    pub linking_id: Uuid,
    pub deposit_destination: String,
    pub country: String,
    pub anonymous_address: Option<Uuid>,
}

impl LinkRequest {
    pub fn from_verified(wallet_id: Uuid, account: &VerifiedAccount) -> Self {
        Self {
            wallet_id,
            custodian: account.custodian,
            linking_id: account.linking_id,
            deposit_destination: account.deposit_destination.clone(),
            country: account.country.clone(),
            anonymous_address: account.anonymous_address,
        }
    }
}

/// Fan-in view of the external account behind a wallet's active link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkingInfo {
    pub linking_id: Uuid,
    pub wallets_linked: usize,
    pub open_linking_slots: usize,
    pub other_wallets_linked: Vec<Uuid>,
    pub next_available_unlinking: Option<DateTime<Utc>>,
}

pub struct LinkingCoordinator {
    db: Arc<LinkDatabase>,
    reputation: Arc<dyn ReputationClient>,
    config: Arc<LinkingConfig>,
}

impl LinkingCoordinator {
    pub fn new(
        db: Arc<LinkDatabase>,
        reputation: Arc<dyn ReputationClient>,
        config: Arc<LinkingConfig>,
    ) -> Self {
        Self {
            db,
            reputation,
            config,
        }
    }

    /// Fan-in maximum for the account: custodian limit plus granted slots.
    pub fn fan_in_max(&self, linking_id: Uuid, custodian: ProviderKind) -> Result<usize, LinkError> {
        let extra = self.db.linking_limit_adjustment(linking_id)?;
        Ok(self.config.linking_limit(custodian) + extra as usize)
    }

    /// Link the account and return the resolved country.
    pub async fn link(&self, req: &LinkRequest) -> Result<String, LinkError> {
        if req.country.is_empty() {
            return Err(LinkError::NoAcceptedDocumentType);
        }

        let mut tx = self
            .db
            .begin(&[LockKey::Linking(req.linking_id), LockKey::Wallet(req.wallet_id)])
            .await;
        let db = tx.db();
        let now = Utc::now();

        if db.get_wallet(req.wallet_id)?.is_none() {
            return Err(LinkError::WalletNotFound(req.wallet_id));
        }

        let current = db.active_link(req.wallet_id, req.custodian)?;
        let reauth = current
            .as_ref()
            .is_some_and(|link| link.linking_id == req.linking_id);
        let last_disconnected = db.latest_disconnected_link(req.wallet_id, req.custodian)?;

        if !reauth {
            if let Some(previous) = &last_disconnected {
                self.check_region_reset(previous, &req.country, now)?;
            }

            let max = self.fan_in_max(req.linking_id, req.custodian)?;
            let held = db
                .active_links(req.linking_id, req.custodian)?
                .iter()
                .filter(|link| link.wallet_id != req.wallet_id)
                .count();
            if held >= max {
                warn!(
                    wallet_id = %req.wallet_id,
                    custodian = %req.custodian,
                    linking_id = %req.linking_id,
                    held,
                    max,
                    "fan-in limit reached"
                );
                return Err(LinkError::TooManyLinked {
                    linking_id: req.linking_id,
                });
            }
            tx.require_fan_in_below(req.linking_id, req.custodian, req.wallet_id, max);
        }

        let verdict = self
            .reputation
            .is_linking_reputable(req.wallet_id, &req.country)
            .await
            .map_err(|e| {
                warn!(wallet_id = %req.wallet_id, error = %e, "reputation check failed");
                LinkError::Unavailable("reputation".into())
            })?;
        if verdict.geo_reset_different() {
            let previous = current
                .as_ref()
                .or(last_disconnected.as_ref())
                .map(|link| link.country.clone())
                .unwrap_or_default();
            return Err(LinkError::GeoResetDifferent {
                previous,
                requested: req.country.clone(),
            });
        }
        if !verdict.reputable() {
            warn!(wallet_id = %req.wallet_id, cohorts = ?verdict.cohorts, "linking flagged by reputation");
            return Err(LinkError::UnusualActivity);
        }

        let mut existing = None;
        for link in db.links_for_wallet(req.wallet_id)? {
            if link.custodian == req.custodian && link.linking_id == req.linking_id {
                existing = Some(link);
            } else if link.is_active() {
                info!(
                    wallet_id = %req.wallet_id,
                    custodian = %link.custodian,
                    linking_id = %link.linking_id,
                    "disconnecting previous link"
                );
                tx.put_link(CustodianLink {
                    disconnected_at: Some(now),
                    ..link
                });
            }
        }

        let row = match existing {
            Some(link) => link.relinked(req.country.clone(), now),
            None => CustodianLink::new(req.wallet_id, req.custodian, req.linking_id, req.country.clone(), now),
        };
        tx.put_link(row);
        tx.set_wallet_linking(
            req.wallet_id,
            Some(WalletLinking {
                linking_id: req.linking_id,
                custodian: req.custodian,
                deposit_destination: req.deposit_destination.clone(),
                anonymous_address: req.anonymous_address,
            }),
        );
        tx.commit()?;

        info!(
            wallet_id = %req.wallet_id,
            custodian = %req.custodian,
            linking_id = %req.linking_id,
            country = %req.country,
            reauth,
            "wallet linked"
        );
        Ok(req.country.clone())
    }

    fn check_region_reset(
        &self,
        previous: &CustodianLink,
        country: &str,
        now: DateTime<Utc>,
    ) -> Result<(), LinkError> {
        let Some(disconnected_at) = previous.disconnected_at else {
            return Ok(());
        };
        if previous.country.is_empty() || previous.country.eq_ignore_ascii_case(country) {
            return Ok(());
        }
        if now - disconnected_at < self.config.geo_reset_cooldown {
            return Err(LinkError::GeoResetDifferent {
                previous: previous.country.clone(),
                requested: country.to_string(),
            });
        }
        Ok(())
    }

    /// Fan-in view for the wallet's active `custodian` link.
    pub fn linking_info(&self, wallet_id: Uuid, custodian: ProviderKind) -> Result<LinkingInfo, LinkError> {
        let link = self
            .db
            .active_link(wallet_id, custodian)?
            .ok_or(LinkError::NoActiveLink(custodian))?;

        let linked = self.db.active_links(link.linking_id, custodian)?;
        let max = self.fan_in_max(link.linking_id, custodian)?;
        let now = Utc::now();
        let next_available_unlinking = self
            .db
            .last_unlinked_at(link.linking_id)?
            .map(|at| at + self.config.unlink_cooldown)
            .filter(|at| *at > now);

        Ok(LinkingInfo {
            linking_id: link.linking_id,
            wallets_linked: linked.len(),
            open_linking_slots: max.saturating_sub(linked.len()),
            other_wallets_linked: linked
                .iter()
                .map(|l| l.wallet_id)
                .filter(|id| *id != wallet_id)
                .collect(),
            next_available_unlinking,
        })
    }
}
