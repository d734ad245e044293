// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Wallet-facing linking endpoints.
//!
//! Every handler runs behind [`BoundWallet`]: the signed wallet must be the
//! wallet named in the path.

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::BoundWallet,
    error::ApiError,
    linking::{LinkError, LinkingInfo},
    models::{
        BitflyerClaimRequest, ChallengeResponse, CreateChallengeRequest, DisconnectResponse,
        GeminiClaimRequest, LinkResponse, SolanaConnectRequest, UpholdClaimRequest,
        ZebpayClaimRequest,
    },
    providers::{LinkProof, ProviderKind},
    state::AppState,
};

async fn claim(state: &AppState, wallet_id: Uuid, proof: LinkProof) -> Result<Json<LinkResponse>, ApiError> {
    let custodian = proof.kind();
    let geo_country = state.service.link(wallet_id, proof).await?;
    info!(%wallet_id, %custodian, %geo_country, "claim accepted");
    Ok(Json(LinkResponse { geo_country }))
}

/// Issue a linking challenge.
///
/// Returns the nonce the wallet embeds in its signed Solana linking message.
/// A new request replaces any outstanding challenge.
#[utoipa::path(
    post,
    path = "/v3/wallet/challenges",
    tag = "Linking",
    request_body = CreateChallengeRequest,
    responses(
        (status = 200, description = "Challenge issued", body = ChallengeResponse),
        (status = 403, description = "Signed by another wallet"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn create_challenge(
    BoundWallet(signed): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<CreateChallengeRequest>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    if request.payment_id != signed {
        return Err(LinkError::WalletMismatch.into());
    }
    let challenge = state.service.create_challenge(request.payment_id)?;
    Ok(Json(ChallengeResponse {
        challenge_id: challenge.nonce,
    }))
}

/// Link a ZebPay account.
#[utoipa::path(
    post,
    path = "/v3/wallet/zebpay/{wallet_id}/claim",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    request_body = ZebpayClaimRequest,
    responses(
        (status = 200, description = "Account linked", body = LinkResponse),
        (status = 400, description = "Invalid proof"),
        (status = 403, description = "Region or reputation rejected"),
        (status = 409, description = "Too many wallets linked to the account")
    )
)]
pub async fn claim_zebpay(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<ZebpayClaimRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    claim(&state, wallet_id, request.into()).await
}

/// Link a Gemini account.
#[utoipa::path(
    post,
    path = "/v3/wallet/gemini/{wallet_id}/claim",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    request_body = GeminiClaimRequest,
    responses(
        (status = 200, description = "Account linked", body = LinkResponse),
        (status = 400, description = "Invalid proof"),
        (status = 403, description = "Region or reputation rejected"),
        (status = 409, description = "Too many wallets linked to the account"),
        (status = 503, description = "Gemini unavailable")
    )
)]
pub async fn claim_gemini(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<GeminiClaimRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    claim(&state, wallet_id, request.into()).await
}

/// Link a bitFlyer account.
#[utoipa::path(
    post,
    path = "/v3/wallet/bitflyer/{wallet_id}/claim",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    request_body = BitflyerClaimRequest,
    responses(
        (status = 200, description = "Account linked", body = LinkResponse),
        (status = 400, description = "Invalid proof"),
        (status = 403, description = "Token bound to another wallet"),
        (status = 409, description = "Too many wallets linked to the account")
    )
)]
pub async fn claim_bitflyer(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<BitflyerClaimRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    claim(&state, wallet_id, request.into()).await
}

/// Link an Uphold card.
#[utoipa::path(
    post,
    path = "/v3/wallet/uphold/{wallet_id}/claim",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    request_body = UpholdClaimRequest,
    responses(
        (status = 200, description = "Account linked", body = LinkResponse),
        (status = 400, description = "Invalid proof"),
        (status = 403, description = "Region or reputation rejected"),
        (status = 409, description = "Too many wallets linked to the account"),
        (status = 503, description = "Uphold unavailable")
    )
)]
pub async fn claim_uphold(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<UpholdClaimRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    claim(&state, wallet_id, request.into()).await
}

/// Connect a Solana address.
#[utoipa::path(
    post,
    path = "/v3/wallet/solana/{wallet_id}/connect",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    request_body = SolanaConnectRequest,
    responses(
        (status = 200, description = "Address linked", body = LinkResponse),
        (status = 400, description = "Invalid signature or message"),
        (status = 403, description = "Not allow listed, blocked, or region rejected"),
        (status = 404, description = "No challenge issued")
    )
)]
pub async fn connect_solana(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Json(request): Json<SolanaConnectRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    claim(&state, wallet_id, request.into()).await
}

/// Disconnect every active custodian link of the wallet.
///
/// Succeeds with `disconnected: 0` when nothing is linked.
#[utoipa::path(
    delete,
    path = "/v3/wallet/{wallet_id}/claim",
    tag = "Linking",
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    responses(
        (status = 200, description = "Links disconnected", body = DisconnectResponse),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn disconnect(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
) -> Result<Json<DisconnectResponse>, ApiError> {
    let disconnected = state.service.disconnect(wallet_id).await?;
    Ok(Json(DisconnectResponse { disconnected }))
}

/// Fan-in state of the wallet's active link at one custodian.
#[utoipa::path(
    get,
    path = "/v3/wallet/{wallet_id}/linking-info/{custodian}",
    tag = "Linking",
    params(
        ("wallet_id" = Uuid, Path, description = "Wallet (payment) id"),
        ("custodian" = String, Path, description = "uphold, gemini, bitflyer, zebpay or solana")
    ),
    responses(
        (status = 200, description = "Linking info", body = LinkingInfo),
        (status = 400, description = "Unknown custodian"),
        (status = 404, description = "No active link")
    )
)]
pub async fn linking_info(
    BoundWallet(wallet_id): BoundWallet,
    State(state): State<AppState>,
    Path(path): Path<(Uuid, String)>,
) -> Result<Json<LinkingInfo>, ApiError> {
    let (_, custodian) = path;
    let custodian: ProviderKind = custodian.parse()?;
    Ok(Json(state.service.linking_info(wallet_id, custodian)?))
}
