// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Persisted record types.
//!
//! All records are stored as JSON values in redb tables (see [`super::LinkDatabase`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::providers::ProviderKind;

/// Rewards wallet as registered upstream.
///
/// The linking fields are only written by the linking and unlink coordinators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WalletRecord {
    pub id: Uuid,
    /// Hex-encoded Ed25519 public key the wallet signs with.
    pub public_key: String,
    pub altcurrency: String,
    pub provider_linking_id: Option<Uuid>,
    pub anonymous_address: Option<Uuid>,
    pub user_deposit_account_provider: Option<ProviderKind>,
    pub user_deposit_destination: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    /// A freshly registered wallet with no linking state.
    pub fn new(id: Uuid, public_key: impl Into<String>, altcurrency: impl Into<String>) -> Self {
        Self {
            id,
            public_key: public_key.into(),
            altcurrency: altcurrency.into(),
            provider_linking_id: None,
            anonymous_address: None,
            user_deposit_account_provider: None,
            user_deposit_destination: None,
            created_at: Utc::now(),
        }
    }

    /// Replace the four linking fields; `None` clears them.
    pub fn apply_linking(&mut self, linking: Option<&WalletLinking>) {
        match linking {
            Some(l) => {
                self.provider_linking_id = Some(l.linking_id);
                self.anonymous_address = l.anonymous_address;
                self.user_deposit_account_provider = Some(l.custodian);
                self.user_deposit_destination = Some(l.deposit_destination.clone());
            }
            None => {
                self.provider_linking_id = None;
                self.anonymous_address = None;
                self.user_deposit_account_provider = None;
                self.user_deposit_destination = None;
            }
        }
    }
}

/// Linking fields written onto a wallet on a successful link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletLinking {
    pub linking_id: Uuid,
    pub custodian: ProviderKind,
    pub deposit_destination: String,
    pub anonymous_address: Option<Uuid>,
}

/// One wallet's link to one external custodial account.
///
/// Rows are never deleted. A link is active while both `disconnected_at`
/// and `unlinked_at` are unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianLink {
    pub wallet_id: Uuid,
    pub custodian: ProviderKind,
    pub linking_id: Uuid,
    /// Country resolved when the link was last made.
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub linked_at: DateTime<Utc>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub unlinked_at: Option<DateTime<Utc>>,
}

impl CustodianLink {
    pub fn new(
        wallet_id: Uuid,
        custodian: ProviderKind,
        linking_id: Uuid,
        country: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            wallet_id,
            custodian,
            linking_id,
            country: country.into(),
            created_at: now,
            linked_at: now,
            disconnected_at: None,
            unlinked_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.disconnected_at.is_none() && self.unlinked_at.is_none()
    }

    /// Reactivate an existing row for a relink.
    pub fn relinked(mut self, country: impl Into<String>, now: DateTime<Utc>) -> Self {
        self.country = country.into();
        self.linked_at = now;
        self.disconnected_at = None;
        self.unlinked_at = None;
        self
    }
}

/// Anti-replay nonce for signature-based linking flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub wallet_id: Uuid,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

/// Wallet admitted to experimental self-custody linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListEntry {
    pub wallet_id: Uuid,
    pub created_at: DateTime<Utc>,
}
