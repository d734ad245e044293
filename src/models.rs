// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the REST API. Field names are camelCase
//! on the wire. Claim bodies convert into the matching [`LinkProof`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::providers::{
    BitflyerProof, GeminiProof, LinkProof, ProviderKind, SolanaProof, UpholdProof, ZebpayProof,
};
use crate::storage::{AllowListEntry, WalletRecord};

// =============================================================================
// Challenges
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengeRequest {
    pub payment_id: Uuid,
}

/// The nonce to embed in a signed linking message.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_id: String,
}

// =============================================================================
// Claims
// =============================================================================

/// ZebPay signed claim set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ZebpayClaimRequest {
    pub linking_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeminiClaimRequest {
    /// Gemini account token.
    pub linking_info: String,
    pub recipient_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BitflyerClaimRequest {
    pub linking_info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpholdClaimRequest {
    pub signed_linking_request: String,
    #[serde(default)]
    pub anonymous_address: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SolanaConnectRequest {
    /// Base58 Solana public key.
    pub solana_public_key: String,
    /// Three-line linking message.
    pub message: String,
    /// Base64url Ed25519 signature over `message`.
    pub solana_signature: String,
}

impl From<ZebpayClaimRequest> for LinkProof {
    fn from(req: ZebpayClaimRequest) -> Self {
        LinkProof::Zebpay(ZebpayProof {
            linking_info: req.linking_info,
        })
    }
}

impl From<GeminiClaimRequest> for LinkProof {
    fn from(req: GeminiClaimRequest) -> Self {
        LinkProof::Gemini(GeminiProof {
            linking_info: req.linking_info,
            recipient_id: req.recipient_id,
        })
    }
}

impl From<BitflyerClaimRequest> for LinkProof {
    fn from(req: BitflyerClaimRequest) -> Self {
        LinkProof::Bitflyer(BitflyerProof {
            linking_info: req.linking_info,
        })
    }
}

impl From<UpholdClaimRequest> for LinkProof {
    fn from(req: UpholdClaimRequest) -> Self {
        LinkProof::Uphold(UpholdProof {
            signed_linking_request: req.signed_linking_request,
            anonymous_address: req.anonymous_address,
        })
    }
}

impl From<SolanaConnectRequest> for LinkProof {
    fn from(req: SolanaConnectRequest) -> Self {
        LinkProof::Solana(SolanaProof {
            solana_public_key: req.solana_public_key,
            message: req.message,
            solana_signature: req.solana_signature,
        })
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkResponse {
    pub geo_country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectResponse {
    /// Number of active links that were disconnected.
    pub disconnected: usize,
}

// =============================================================================
// Admin
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterWalletRequest {
    pub payment_id: Uuid,
    /// Hex Ed25519 public key.
    pub public_key: String,
    pub altcurrency: String,
    #[serde(default)]
    pub geo_country: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalletResponse {
    pub payment_id: Uuid,
    pub public_key: String,
    pub altcurrency: String,
    pub provider_linking_id: Option<Uuid>,
    pub deposit_provider: Option<ProviderKind>,
    pub deposit_destination: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletRecord> for WalletResponse {
    fn from(w: WalletRecord) -> Self {
        Self {
            payment_id: w.id,
            public_key: w.public_key,
            altcurrency: w.altcurrency,
            provider_linking_id: w.provider_linking_id,
            deposit_provider: w.user_deposit_account_provider,
            deposit_destination: w.user_deposit_destination,
            created_at: w.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllowListResponse {
    pub payment_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<AllowListEntry> for AllowListResponse {
    fn from(entry: AllowListEntry) -> Self {
        Self {
            payment_id: entry.wallet_id,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkingLimitResponse {
    pub linking_id: Uuid,
    /// Slots granted above the custodian's configured limit.
    pub extra_slots: u32,
}
