// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::linking::{ErrorKind, LinkError};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub error_code: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    error_code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>, error_code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            error_code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "invalid_input")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error", "internal_error")
    }
}

impl From<LinkError> for ApiError {
    fn from(err: LinkError) -> Self {
        if err.kind() == ErrorKind::Internal {
            error!(error = %err, "linking request failed");
            return Self::internal();
        }
        Self::new(err.status_code(), err.to_string(), err.error_code())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            error_code: self.error_code,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use axum::body::to_bytes;
    use uuid::Uuid;

    #[test]
    fn link_errors_keep_status_and_code() {
        let err: ApiError = LinkError::TooManyLinked {
            linking_id: Uuid::nil(),
        }
        .into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error_code, "too_many_linked");

        let err: ApiError = LinkError::InvalidCountry("KP".into()).into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert!(err.message.contains("KP"));
    }

    #[test]
    fn internal_errors_are_generic() {
        let err: ApiError = LinkError::Storage(StorageError::NotFound("wallets".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "internal error");
        assert_eq!(err.error_code, "internal_error");
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(body, r#"{"error":"bad data","error_code":"invalid_input"}"#);
    }
}
