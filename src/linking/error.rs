// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linking errors.
//!
//! Every failure belongs to one [`ErrorKind`]. Validation and compliance
//! failures carry a stable `error_code` clients key their messaging on.

use axum::http::StatusCode;
use tracing::warn;
use uuid::Uuid;

use crate::clients::ClientError;
use crate::providers::ProviderKind;
use crate::storage::StorageError;

/// Error taxonomy shared by every linking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or expired proof, bad signature.
    Validation,
    /// Blocked region or failed reputation check.
    Compliance,
    /// Fan-in limit reached or a conflicting concurrent change.
    Conflict,
    /// Wallet, challenge or link missing.
    NotFound,
    /// Proof does not bind to the calling wallet.
    AuthBinding,
    /// Downstream collaborator temporarily unavailable. Safe to retry.
    Transient,
    /// Storage failure or misconfiguration.
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    // --- validation ---
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("claims could not be decoded: {0}")]
    ClaimsMalformed(String),
    #[error("iat claim missing")]
    InvalidIat,
    #[error("exp claim missing")]
    InvalidExp,
    #[error("token is not valid yet")]
    TokenNotYetValid,
    #[error("token has expired")]
    TokenExpired,
    #[error("account has not passed KYC")]
    InvalidKyc,
    #[error("deposit id missing")]
    InvalidDepositId,
    #[error("account id missing")]
    InvalidAccountId,
    #[error("linking request timestamp is too old")]
    TimestampExpired,
    #[error("linking request id was already used")]
    RequestIdSpent,
    #[error("invalid signature: {0}")]
    InvalidSignature(&'static str),
    #[error("malformed linking message: {0}")]
    MalformedMessage(String),
    #[error("challenge has expired")]
    ChallengeExpired,
    #[error("unknown custodian: {0}")]
    UnknownCustodian(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // --- compliance ---
    #[error("region not supported: {0}")]
    InvalidCountry(String),
    #[error("no accepted identity document type")]
    NoAcceptedDocumentType,
    #[error("unusual activity detected")]
    UnusualActivity,
    #[error("region changed from {previous} to {requested} within cooldown")]
    GeoResetDifferent { previous: String, requested: String },
    #[error("address is not allowed")]
    AddressBlocked,
    #[error("wallet is not on the allow list")]
    NotAllowListed,
    #[error("linking to {0} is temporarily unavailable")]
    LinkingDisabled(ProviderKind),

    // --- conflict ---
    #[error("too many wallets linked to account {linking_id}")]
    TooManyLinked { linking_id: Uuid },
    #[error("unlinking limit reached for this account")]
    UnlinkingsExceeded,
    #[error("already exists: {0}")]
    AlreadyExists(String),

    // --- not found ---
    #[error("wallet not found: {0}")]
    WalletNotFound(Uuid),
    #[error("challenge not found")]
    ChallengeNotFound,
    #[error("no active {0} link")]
    NoActiveLink(ProviderKind),

    // --- auth binding ---
    #[error("linking proof is bound to a different account")]
    AccountMismatch,
    #[error("linking proof is bound to a different wallet")]
    WalletMismatch,

    // --- transient ---
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    // --- internal ---
    #[error("storage failure: {0}")]
    Storage(StorageError),
    #[error("misconfigured: {0}")]
    Misconfigured(String),
}

impl LinkError {
    pub fn kind(&self) -> ErrorKind {
        use LinkError::*;
        match self {
            InvalidToken(_) | ClaimsMalformed(_) | InvalidIat | InvalidExp | TokenNotYetValid
            | TokenExpired | InvalidKyc | InvalidDepositId | InvalidAccountId
            | TimestampExpired | RequestIdSpent | InvalidSignature(_) | MalformedMessage(_)
            | ChallengeExpired | UnknownCustodian(_) | InvalidInput(_) => ErrorKind::Validation,
            InvalidCountry(_) | NoAcceptedDocumentType | UnusualActivity
            | GeoResetDifferent { .. } | AddressBlocked | NotAllowListed | LinkingDisabled(_) => {
                ErrorKind::Compliance
            }
            TooManyLinked { .. } | UnlinkingsExceeded | AlreadyExists(_) => ErrorKind::Conflict,
            WalletNotFound(_) | ChallengeNotFound | NoActiveLink(_) => ErrorKind::NotFound,
            AccountMismatch | WalletMismatch => ErrorKind::AuthBinding,
            Unavailable(_) => ErrorKind::Transient,
            Storage(_) | Misconfigured(_) => ErrorKind::Internal,
        }
    }

    /// Stable reason code for client messaging.
    pub fn error_code(&self) -> &'static str {
        use LinkError::*;
        match self {
            InvalidToken(_) => "invalid_token",
            ClaimsMalformed(_) => "validation_failed",
            InvalidIat => "invalid_iat",
            InvalidExp => "invalid_exp",
            TokenNotYetValid => "token_not_yet_valid",
            TokenExpired => "token_expired",
            InvalidKyc => "invalid_kyc",
            InvalidDepositId => "invalid_deposit_id",
            InvalidAccountId => "invalid_account_id",
            TimestampExpired => "timestamp_expired",
            RequestIdSpent => "request_id_spent",
            InvalidSignature(_) => "invalid_signature",
            MalformedMessage(_) => "malformed_message",
            ChallengeExpired => "challenge_expired",
            UnknownCustodian(_) => "unknown_custodian",
            InvalidInput(_) => "invalid_input",
            InvalidCountry(_) => "invalid_country",
            NoAcceptedDocumentType => "no_accepted_document_type",
            UnusualActivity => "unusual_activity",
            GeoResetDifferent { .. } => "geo_reset_different",
            AddressBlocked => "address_blocked",
            NotAllowListed => "not_allow_listed",
            LinkingDisabled(_) => "linking_disabled",
            TooManyLinked { .. } => "too_many_linked",
            UnlinkingsExceeded => "unlinkings_exceeded",
            AlreadyExists(_) => "already_exists",
            WalletNotFound(_) => "wallet_not_found",
            ChallengeNotFound => "challenge_not_found",
            NoActiveLink(_) => "no_active_link",
            AccountMismatch => "account_mismatch",
            WalletMismatch => "wallet_mismatch",
            Unavailable(_) => "upstream_unavailable",
            Storage(_) | Misconfigured(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Compliance | ErrorKind::AuthBinding => StatusCode::FORBIDDEN,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for LinkError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::FanInExceeded { linking_id, .. } => LinkError::TooManyLinked { linking_id },
            StorageError::AlreadyExists(what) => LinkError::AlreadyExists(what),
            other => LinkError::Storage(other),
        }
    }
}

/// Upstream bodies and paths stay in the logs; clients only see a fixed message.
impl From<ClientError> for LinkError {
    fn from(err: ClientError) -> Self {
        if err.is_transient() {
            warn!(error = %err, "custodian request failed");
            return LinkError::Unavailable("custodian".into());
        }
        match err.status() {
            Some(400 | 404 | 422) => {
                warn!(error = %err, "custodian rejected token");
                LinkError::InvalidToken("rejected by custodian".into())
            }
            _ => LinkError::Misconfigured(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_in_storage_error_becomes_conflict() {
        let linking_id = Uuid::new_v4();
        let err: LinkError = StorageError::FanInExceeded { linking_id, max: 4 }.into();
        assert!(matches!(err, LinkError::TooManyLinked { linking_id: id } if id == linking_id));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn other_storage_errors_are_internal() {
        let err: LinkError = StorageError::NotFound("wallet".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.error_code(), "internal_error");
    }

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(LinkError::InvalidKyc.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            LinkError::InvalidCountry("KP".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(LinkError::ChallengeNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(LinkError::WalletMismatch.kind(), ErrorKind::AuthBinding);
        assert_eq!(
            LinkError::Unavailable("gemini".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn custodian_rejections_hide_upstream_body() {
        let rejected: LinkError = ClientError::Status {
            method: reqwest::Method::POST,
            path: "/v1/account".into(),
            status: 404,
            body: "secret-upstream-body".into(),
        }
        .into();
        assert_eq!(rejected.kind(), ErrorKind::Validation);
        assert!(!rejected.to_string().contains("secret-upstream-body"));
        assert!(!rejected.to_string().contains("/v1/account"));
    }

    #[test]
    fn custodian_auth_failures_are_internal() {
        let unauthorized: LinkError = ClientError::Status {
            method: reqwest::Method::GET,
            path: "/v1/me".into(),
            status: 401,
            body: "secret-upstream-body".into(),
        }
        .into();
        assert_eq!(unauthorized.kind(), ErrorKind::Internal);
        let api = crate::error::ApiError::from(unauthorized);
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api.message.contains("secret-upstream-body"));

        let garbled: LinkError = ClientError::InvalidResponse("/v1/me: expected value".into()).into();
        assert_eq!(garbled.kind(), ErrorKind::Internal);
        let api = crate::error::ApiError::from(garbled);
        assert!(!api.message.contains("/v1/me"));
    }

    #[test]
    fn custodian_outage_message_is_fixed() {
        let outage: LinkError = ClientError::Status {
            method: reqwest::Method::GET,
            path: "/v1/me".into(),
            status: 502,
            body: "bad gateway from 10.0.0.7".into(),
        }
        .into();
        assert_eq!(outage.kind(), ErrorKind::Transient);
        let api = crate::error::ApiError::from(outage);
        assert_eq!(api.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!api.message.contains("10.0.0.7"));
    }

    #[test]
    fn geo_reset_message_names_both_regions() {
        let err = LinkError::GeoResetDifferent {
            previous: "US".into(),
            requested: "FR".into(),
        };
        assert_eq!(err.error_code(), "geo_reset_different");
        assert!(err.to_string().contains("US"));
        assert!(err.to_string().contains("FR"));
    }
}
