// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request binding and admin authorization.
//!
//! Wallet requests arrive through a gateway that has already verified the
//! wallet's HTTP signature; it forwards the verified key id in
//! `X-Wallet-Id`. [`BoundWallet`] rejects requests whose path names a
//! different wallet than the one that signed.
//!
//! Admin routes carry `Authorization: Bearer <ADMIN_API_TOKEN>`. With no
//! token configured every admin request is refused.

use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Path},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// Header carrying the verified wallet id.
pub const WALLET_ID_HEADER: &str = "x-wallet-id";

#[derive(Debug)]
pub enum AuthError {
    /// No `X-Wallet-Id` header present
    MissingWalletId,
    /// `X-Wallet-Id` or the path wallet is not a UUID
    InvalidWalletId,
    /// Signed wallet differs from the path wallet
    WalletMismatch,
    /// No authorization header present
    MissingAuthHeader,
    /// Invalid authorization header format
    InvalidAuthHeader,
    /// Bearer token does not match
    InvalidToken,
    /// No admin token configured
    AdminDisabled,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingWalletId => "missing_wallet_id",
            AuthError::InvalidWalletId => "invalid_wallet_id",
            AuthError::WalletMismatch => "wallet_mismatch",
            AuthError::MissingAuthHeader => "missing_auth_header",
            AuthError::InvalidAuthHeader => "invalid_auth_header",
            AuthError::InvalidToken => "invalid_token",
            AuthError::AdminDisabled => "admin_disabled",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingWalletId
            | AuthError::MissingAuthHeader
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
            AuthError::InvalidWalletId => StatusCode::BAD_REQUEST,
            AuthError::WalletMismatch | AuthError::AdminDisabled => StatusCode::FORBIDDEN,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingWalletId => write!(f, "X-Wallet-Id header is required"),
            AuthError::InvalidWalletId => write!(f, "Wallet id must be a UUID"),
            AuthError::WalletMismatch => write!(f, "Request is signed by a different wallet"),
            AuthError::MissingAuthHeader => write!(f, "Authorization header is required"),
            AuthError::InvalidAuthHeader => {
                write!(f, "Invalid authorization header format (expected 'Bearer <token>')")
            }
            AuthError::InvalidToken => write!(f, "Admin token is invalid"),
            AuthError::AdminDisabled => write!(f, "Admin API is not enabled"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}

/// The wallet that signed the request.
///
/// When the matched route has a `{wallet_id}` segment it must name the same
/// wallet. Routes without one compare against their body themselves.
pub struct BoundWallet(pub Uuid);

impl FromRequestParts<AppState> for BoundWallet {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let signed = parts
            .headers
            .get(WALLET_ID_HEADER)
            .ok_or(AuthError::MissingWalletId)?
            .to_str()
            .map_err(|_| AuthError::InvalidWalletId)?;
        let signed = Uuid::parse_str(signed.trim()).map_err(|_| AuthError::InvalidWalletId)?;

        if let Ok(Path(params)) = Path::<HashMap<String, String>>::from_request_parts(parts, state).await {
            if let Some(path_wallet) = params.get("wallet_id") {
                let path_wallet = Uuid::parse_str(path_wallet).map_err(|_| AuthError::InvalidWalletId)?;
                if path_wallet != signed {
                    warn!(%signed, %path_wallet, "wallet binding mismatch");
                    return Err(AuthError::WalletMismatch);
                }
            }
        }

        Ok(BoundWallet(signed))
    }
}

/// Extractor for admin routes.
pub struct AdminToken;

impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let expected = state
            .config
            .admin_api_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::AdminDisabled)?;

        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(AuthError::MissingAuthHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidAuthHeader)?;

        // Compare digests so the comparison time does not depend on a shared prefix.
        if Sha256::digest(token.as_bytes()) != Sha256::digest(expected.as_bytes()) {
            warn!("admin request with invalid token");
            return Err(AuthError::InvalidToken);
        }
        Ok(AdminToken)
    }
}
