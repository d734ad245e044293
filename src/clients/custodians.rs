// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodian APIs used during proof verification (Gemini, Uphold).

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ClientError, JsonApi};

// =============================================================================
// Gemini
// =============================================================================

/// Identity document Gemini has verified for an account.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiDocument {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub issuing_country: String,
}

/// Account bundle returned for a linking token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiAccount {
    pub id: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub valid_documents: Vec<GeminiDocument>,
}

#[async_trait]
pub trait GeminiApi: Send + Sync {
    /// Exchange a linking token for the account it belongs to.
    async fn validate_account(&self, token: &str, recipient_id: &str) -> Result<GeminiAccount, ClientError>;
}

#[derive(Serialize)]
struct ValidateAccountBody<'a> {
    token: &'a str,
    recipient_id: &'a str,
}

pub struct HttpGeminiApi {
    api: JsonApi,
}

impl HttpGeminiApi {
    pub fn new(server: &str, api_key: Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonApi::new(server, api_key)?,
        })
    }
}

#[async_trait]
impl GeminiApi for HttpGeminiApi {
    async fn validate_account(&self, token: &str, recipient_id: &str) -> Result<GeminiAccount, ClientError> {
        let body = ValidateAccountBody { token, recipient_id };
        self.api
            .send_json(Method::POST, "v1/account/validate", &body)
            .await
    }
}

// =============================================================================
// Uphold
// =============================================================================

/// Result of submitting a signed linking transaction to Uphold.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpholdLinkingResult {
    pub user_id: String,
    /// Uphold membership implies completed KYC.
    pub is_member: bool,
    #[serde(default)]
    pub identity_country: String,
    #[serde(default)]
    pub citizenship_country: String,
    #[serde(default)]
    pub residence_country: String,
    /// Card the linking transaction was addressed to.
    pub destination: String,
}

#[async_trait]
pub trait UpholdApi: Send + Sync {
    async fn submit_linking_request(&self, signed_request: &str) -> Result<UpholdLinkingResult, ClientError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkingRequestBody<'a> {
    signed_linking_request: &'a str,
}

pub struct HttpUpholdApi {
    api: JsonApi,
}

impl HttpUpholdApi {
    pub fn new(server: &str, access_token: Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonApi::new(server, access_token)?,
        })
    }
}

#[async_trait]
impl UpholdApi for HttpUpholdApi {
    async fn submit_linking_request(&self, signed_request: &str) -> Result<UpholdLinkingResult, ClientError> {
        let body = LinkingRequestBody {
            signed_linking_request: signed_request,
        };
        let result: UpholdLinkingResult = self.api.send_json(Method::POST, "v0/me/linking", &body).await?;
        info!(user_id = %result.user_id, member = result.is_member, "uphold linking request accepted");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_account_decodes_documents() {
        let json = r#"{
            "id": "acct-1",
            "countryCode": "us",
            "validDocuments": [{"type": "passport", "issuingCountry": "CA"}]
        }"#;
        let account: GeminiAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.id, "acct-1");
        assert_eq!(account.valid_documents[0].doc_type, "passport");
        assert_eq!(account.valid_documents[0].issuing_country, "CA");
    }

    #[test]
    fn uphold_result_defaults_countries() {
        let json = r#"{"userId":"u1","isMember":true,"destination":"card-1"}"#;
        let result: UpholdLinkingResult = serde_json::from_str(json).unwrap();
        assert!(result.is_member);
        assert_eq!(result.identity_country, "");
    }
}
