// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Geo country validator client.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ClientError, JsonApi};

#[async_trait]
pub trait GeoCountryValidator: Send + Sync {
    /// Whether wallets from `country` may use self-custody linking.
    async fn validate(&self, country: &str) -> Result<bool, ClientError>;
}

#[derive(Deserialize)]
struct ValidateResponse {
    allowed: bool,
}

pub struct HttpGeoCountryValidator {
    api: JsonApi,
}

impl HttpGeoCountryValidator {
    pub fn new(server: &str) -> Result<Self, ClientError> {
        Ok(Self {
            api: JsonApi::new(server, None)?,
        })
    }
}

#[async_trait]
impl GeoCountryValidator for HttpGeoCountryValidator {
    async fn validate(&self, country: &str) -> Result<bool, ClientError> {
        if country.is_empty() {
            return Ok(false);
        }
        let response: ValidateResponse = self
            .api
            .get_json("v1/geo-country/validate", &[("country", country)])
            .await?;
        Ok(response.allowed)
    }
}
