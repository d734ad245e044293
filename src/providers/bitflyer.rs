// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! bitFlyer linking claims.
//!
//! The claim set is minted by bitFlyer for one wallet: `external_account_id`
//! is the hex SHA-256 of the wallet id, so a token lifted from one wallet's
//! session cannot link another. Each `request_id` is accepted once.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{decode_hs256, ProviderKind, VerifiedAccount, VerifyLinkProof};
use crate::linking::LinkError;
use crate::storage::{LinkDatabase, WalletRecord};

/// bitFlyer only serves Japanese residents.
pub const BITFLYER_COUNTRY: &str = "JP";

/// Accepted distance between the claim timestamp and now.
const TIMESTAMP_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct BitflyerProof {
    pub linking_info: String,
}

#[derive(Debug, Deserialize)]
struct BitflyerClaims {
    #[serde(default)]
    deposit_id: String,
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    account_hash: String,
    #[serde(default)]
    external_account_id: String,
    timestamp: DateTime<Utc>,
}

/// Hex SHA-256 of the wallet id, as bitFlyer embeds it.
pub fn wallet_binding(wallet: &WalletRecord) -> String {
    hex::encode(Sha256::digest(wallet.id.to_string().as_bytes()))
}

pub struct BitflyerVerifier {
    key: Option<Vec<u8>>,
    db: Arc<LinkDatabase>,
}

impl BitflyerVerifier {
    pub fn new(key: Option<Vec<u8>>, db: Arc<LinkDatabase>) -> Self {
        Self { key, db }
    }
}

#[async_trait]
impl VerifyLinkProof for BitflyerVerifier {
    type Proof = BitflyerProof;

    async fn verify(
        &self,
        caller: &WalletRecord,
        proof: &BitflyerProof,
    ) -> Result<VerifiedAccount, LinkError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| LinkError::Misconfigured("BITFLYER_JWT_KEY is not set".into()))?;
        let claims: BitflyerClaims = decode_hs256(&proof.linking_info, key)?;

        let now = Utc::now();
        if (now - claims.timestamp).abs() > Duration::seconds(TIMESTAMP_WINDOW_SECS) {
            return Err(LinkError::TimestampExpired);
        }
        if !claims.external_account_id.eq_ignore_ascii_case(&wallet_binding(caller)) {
            warn!(wallet_id = %caller.id, "bitflyer token bound to another wallet");
            return Err(LinkError::AccountMismatch);
        }
        if claims.deposit_id.is_empty() {
            return Err(LinkError::InvalidDepositId);
        }
        if claims.account_hash.is_empty() {
            return Err(LinkError::InvalidAccountId);
        }
        if claims.request_id.is_empty() {
            return Err(LinkError::InvalidToken("request_id missing".into()));
        }
        if !self.db.consume_request_id(&claims.request_id, now)? {
            return Err(LinkError::RequestIdSpent);
        }

        Ok(VerifiedAccount::new(
            ProviderKind::Bitflyer,
            claims.account_hash,
            claims.deposit_id,
            BITFLYER_COUNTRY,
        ))
    }
}
