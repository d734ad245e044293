// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Reputation service client.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::{ClientError, JsonApi, RetryPolicy};

/// Cohort reported for a wallet in good standing.
pub const COHORT_OK: i32 = 1;
/// Cohort reported when the wallet re-linked from a different region.
pub const COHORT_GEO_RESET_DIFFERENT: i32 = 7;

/// Linking reputation verdict.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkingVerdict {
    pub cohorts: Vec<i32>,
}

impl LinkingVerdict {
    pub fn reputable(&self) -> bool {
        self.cohorts.contains(&COHORT_OK)
    }

    pub fn geo_reset_different(&self) -> bool {
        self.cohorts.contains(&COHORT_GEO_RESET_DIFFERENT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReputationSummary {
    #[serde(default)]
    pub geo_country: String,
}

#[async_trait]
pub trait ReputationClient: Send + Sync {
    async fn is_linking_reputable(
        &self,
        wallet_id: Uuid,
        country: &str,
    ) -> Result<LinkingVerdict, ClientError>;

    async fn get_reputation_summary(&self, wallet_id: Uuid) -> Result<ReputationSummary, ClientError>;

    /// Create or replace the wallet's summary with its registration country.
    async fn upsert_reputation_summary(&self, wallet_id: Uuid, geo_country: &str) -> Result<(), ClientError>;

    /// Mark whether the wallet has a verified custodian link.
    async fn update_reputation_summary(&self, wallet_id: Uuid, verified_wallet: bool) -> Result<(), ClientError>;
}

#[derive(Serialize)]
struct UpsertSummaryBody<'a> {
    payment_id: String,
    geo_country: &'a str,
}

#[derive(Serialize)]
struct UpdateSummaryBody {
    verified_wallet: bool,
}

/// HTTP client for the reputation service.
///
/// Summary writes are retried with [`RetryPolicy`]; reads are not.
pub struct HttpReputationClient {
    api: JsonApi,
    retry: RetryPolicy,
}

impl HttpReputationClient {
    pub fn new(server: &str, token: Option<String>) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonApi::new(server, token)?,
            retry: RetryPolicy::default(),
        })
    }
}

#[async_trait]
impl ReputationClient for HttpReputationClient {
    async fn is_linking_reputable(
        &self,
        wallet_id: Uuid,
        country: &str,
    ) -> Result<LinkingVerdict, ClientError> {
        let path = format!("v2/reputation/{wallet_id}/grants");
        let verdict: LinkingVerdict = self.api.get_json(&path, &[("country", country)]).await?;
        debug!(%wallet_id, cohorts = ?verdict.cohorts, "linking reputation verdict");
        Ok(verdict)
    }

    async fn get_reputation_summary(&self, wallet_id: Uuid) -> Result<ReputationSummary, ClientError> {
        self.api
            .get_json(&format!("v1/reputation-summary/{wallet_id}"), &[])
            .await
    }

    async fn upsert_reputation_summary(&self, wallet_id: Uuid, geo_country: &str) -> Result<(), ClientError> {
        let body = UpsertSummaryBody {
            payment_id: wallet_id.to_string(),
            geo_country,
        };
        let (api, body) = (&self.api, &body);
        self.retry
            .run("upsert_reputation_summary", move || {
                api.send_unit(Method::POST, "v1/reputation-summary", body)
            })
            .await
    }

    async fn update_reputation_summary(&self, wallet_id: Uuid, verified_wallet: bool) -> Result<(), ClientError> {
        let path = format!("v1/reputation-summary/{wallet_id}");
        let body = UpdateSummaryBody { verified_wallet };
        let (api, path, body) = (&self.api, path.as_str(), &body);
        self.retry
            .run("update_reputation_summary", move || {
                api.send_unit(Method::PATCH, path, body)
            })
            .await
    }
}
