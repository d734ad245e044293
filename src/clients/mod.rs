// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Collaborator Clients
//!
//! HTTP clients for the services the linking engine consults but does not
//! own. Each one sits behind a trait so the engine can be exercised with
//! in-memory fakes.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};

pub mod custodians;
pub mod geo;
pub mod regions;
pub mod reputation;
pub mod retry;

pub use custodians::{
    GeminiAccount, GeminiApi, GeminiDocument, HttpGeminiApi, HttpUpholdApi, UpholdApi,
    UpholdLinkingResult,
};
pub use geo::{GeoCountryValidator, HttpGeoCountryValidator};
pub use regions::{HttpRegionSource, RegionSource};
pub use reputation::{HttpReputationClient, LinkingVerdict, ReputationClient, ReputationSummary};
pub use retry::RetryPolicy;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("configuration missing: {0}")]
    MissingConfig(String),

    #[error("{method} {path} failed: {source}")]
    Request {
        method: Method,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: Method,
        path: String,
        status: u16,
        body: String,
    },

    #[error("response was invalid: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Whether the caller may succeed by retrying later.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Request { .. } => true,
            ClientError::Status { status, .. } => *status >= 500 || *status == 429,
            ClientError::MissingConfig(_) | ClientError::InvalidResponse(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Base URL plus optional bearer token, shared by the JSON clients.
#[derive(Debug, Clone)]
pub struct JsonApi {
    base_url: String,
    token: Option<String>,
    http: Client,
}

impl JsonApi {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ClientError::MissingConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let response = self.send(Method::GET, path, self.request(Method::GET, path).query(query)).await?;
        decode(path, response).await
    }

    pub async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .send(method.clone(), path, self.request(method, path).json(body))
            .await?;
        decode(path, response).await
    }

    /// Send a JSON body and ignore the response body.
    pub async fn send_unit<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<(), ClientError> {
        self.send(method.clone(), path, self.request(method, path).json(body))
            .await
            .map(|_| ())
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let response = builder.send().await.map_err(|source| ClientError::Request {
            method: method.clone(),
            path: path.to_string(),
            source,
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                method,
                path: path.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> Result<T, ClientError> {
    response
        .json()
        .await
        .map_err(|e| ClientError::InvalidResponse(format!("{path}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClientError {
        ClientError::Status {
            method: Method::GET,
            path: "/x".into(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn server_errors_are_transient() {
        assert!(status(502).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!ClientError::InvalidResponse("x".into()).is_transient());
    }

    #[test]
    fn base_url_is_normalized() {
        let api = JsonApi::new("https://example.test/", None).unwrap();
        assert_eq!(api.base_url, "https://example.test");
    }
}
