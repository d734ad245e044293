// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Operator endpoints.
//!
//! All routes require `Authorization: Bearer <ADMIN_API_TOKEN>`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    auth::AdminToken,
    error::ApiError,
    models::{AllowListResponse, LinkingLimitResponse, RegisterWalletRequest, WalletResponse},
    providers::ProviderKind,
    state::AppState,
};

/// Register a wallet and its signing key.
#[utoipa::path(
    post,
    path = "/v3/admin/wallets",
    tag = "Admin",
    security(("bearer_auth" = [])),
    request_body = RegisterWalletRequest,
    responses(
        (status = 201, description = "Wallet registered", body = WalletResponse),
        (status = 400, description = "Invalid public key"),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Wallet already registered")
    )
)]
pub async fn register_wallet(
    _admin: AdminToken,
    State(state): State<AppState>,
    Json(request): Json<RegisterWalletRequest>,
) -> Result<(StatusCode, Json<WalletResponse>), ApiError> {
    let wallet = state
        .service
        .register_wallet(
            request.payment_id,
            &request.public_key,
            &request.altcurrency,
            request.geo_country.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(wallet.into())))
}

/// Admit a wallet to self-custody (Solana) linking.
#[utoipa::path(
    post,
    path = "/v3/admin/allow-list/{wallet_id}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("wallet_id" = Uuid, Path, description = "Wallet (payment) id")),
    responses(
        (status = 200, description = "Wallet allow listed", body = AllowListResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Wallet not found")
    )
)]
pub async fn allow_list(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(wallet_id): Path<Uuid>,
) -> Result<Json<AllowListResponse>, ApiError> {
    let entry = state.service.allow_list(wallet_id)?;
    Ok(Json(entry.into()))
}

/// Grant one more wallet slot to an external account.
#[utoipa::path(
    post,
    path = "/v3/admin/linking-limit/{linking_id}/increase",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(("linking_id" = Uuid, Path, description = "Linking id of the external account")),
    responses(
        (status = 200, description = "Limit increased", body = LinkingLimitResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn increase_linking_limit(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path(linking_id): Path<Uuid>,
) -> Result<Json<LinkingLimitResponse>, ApiError> {
    let extra_slots = state.service.increase_linking_limit(linking_id)?;
    Ok(Json(LinkingLimitResponse {
        linking_id,
        extra_slots,
    }))
}

/// Unlink a wallet from its account at one custodian, freeing the slot.
#[utoipa::path(
    post,
    path = "/v3/admin/wallet/{wallet_id}/unlink/{custodian}",
    tag = "Admin",
    security(("bearer_auth" = [])),
    params(
        ("wallet_id" = Uuid, Path, description = "Wallet (payment) id"),
        ("custodian" = String, Path, description = "uphold, gemini, bitflyer, zebpay or solana")
    ),
    responses(
        (status = 204, description = "Wallet unlinked"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "No active link"),
        (status = 409, description = "Unlinking limit reached")
    )
)]
pub async fn unlink(
    _admin: AdminToken,
    State(state): State<AppState>,
    Path((wallet_id, custodian)): Path<(Uuid, String)>,
) -> Result<StatusCode, ApiError> {
    let custodian: ProviderKind = custodian.parse()?;
    state.service.unlink(wallet_id, custodian).await?;
    Ok(StatusCode::NO_CONTENT)
}
