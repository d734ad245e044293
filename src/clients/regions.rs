// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodian region document source.

use async_trait::async_trait;

use super::{ClientError, JsonApi};
use crate::linking::compliance::CustodianRegions;

#[async_trait]
pub trait RegionSource: Send + Sync {
    async fn fetch(&self) -> Result<CustodianRegions, ClientError>;
}

/// Reads the region document from an object-storage URL.
pub struct HttpRegionSource {
    api: JsonApi,
    object: String,
}

impl HttpRegionSource {
    /// `url` is the full object URL, e.g. `https://bucket.example/custodian-regions.json`.
    pub fn new(url: &str) -> Result<Self, ClientError> {
        let (base, object) = url
            .rsplit_once('/')
            .filter(|(base, object)| !base.is_empty() && !object.is_empty())
            .ok_or_else(|| ClientError::MissingConfig(format!("invalid region document url: {url}")))?;
        Ok(Self {
            api: JsonApi::new(base, None)?,
            object: object.to_string(),
        })
    }
}

#[async_trait]
impl RegionSource for HttpRegionSource {
    async fn fetch(&self) -> Result<CustodianRegions, ClientError> {
        self.api.get_json(&self.object, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_object_url() {
        let source = HttpRegionSource::new("https://bucket.test/cfg/custodian-regions.json").unwrap();
        assert_eq!(source.object, "custodian-regions.json");
        assert!(HttpRegionSource::new("custodian-regions.json").is_err());
    }
}
