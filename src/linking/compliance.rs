// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Compliance Gate
//!
//! Region verdicts per custodian. When custodian regions are enabled the
//! verdict comes from an allow/block document refreshed in the background
//! by [`RegionRefresher`]; otherwise a static country block list applies.
//!
//! The document is held as one immutable snapshot. Readers clone the
//! current `Arc` under a brief read lock; the refresher swaps in a whole
//! new snapshot under the write lock.
//!
//! A negative verdict is overridden when the wallet was already linked to
//! the same external account at some point (grandfathering).

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::LinkError;
use crate::clients::RegionSource;
use crate::config::RegionConfig;
use crate::providers::{ProviderKind, VerifiedAccount};
use crate::storage::LinkDatabase;

/// Allow and block lists of one custodian.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoAllowBlock {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub block: Vec<String>,
}

impl GeoAllowBlock {
    /// Allowed if any country is on the allow list, otherwise allowed
    /// unless any country is on the block list.
    pub fn verdict(&self, countries: &[&str]) -> bool {
        let listed = |list: &[String]| {
            list.iter()
                .any(|c| countries.iter().any(|country| c.eq_ignore_ascii_case(country)))
        };
        listed(&self.allow) || !listed(&self.block)
    }
}

/// The region document, one entry per custodian.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodianRegions {
    #[serde(default)]
    pub uphold: GeoAllowBlock,
    #[serde(default)]
    pub gemini: GeoAllowBlock,
    #[serde(default)]
    pub bitflyer: GeoAllowBlock,
    #[serde(default)]
    pub zebpay: GeoAllowBlock,
    #[serde(default)]
    pub solana: GeoAllowBlock,
}

impl CustodianRegions {
    pub fn for_custodian(&self, custodian: ProviderKind) -> &GeoAllowBlock {
        match custodian {
            ProviderKind::Uphold => &self.uphold,
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Bitflyer => &self.bitflyer,
            ProviderKind::Zebpay => &self.zebpay,
            ProviderKind::Solana => &self.solana,
        }
    }
}

/// Region table as of one refresh.
#[derive(Debug, Clone, Default)]
pub struct RegionSnapshot {
    pub regions: CustodianRegions,
    /// `None` until the first successful refresh.
    pub fetched_at: Option<DateTime<Utc>>,
}

pub struct ComplianceGate {
    use_custodian_regions: bool,
    blacklist: Vec<String>,
    snapshot: RwLock<Arc<RegionSnapshot>>,
}

impl ComplianceGate {
    pub fn new(config: &RegionConfig) -> Self {
        Self {
            use_custodian_regions: config.use_custodian_regions,
            blacklist: config
                .blacklisted_countries
                .iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            snapshot: RwLock::new(Arc::new(RegionSnapshot::default())),
        }
    }

    pub fn uses_custodian_regions(&self) -> bool {
        self.use_custodian_regions
    }

    pub fn snapshot(&self) -> Arc<RegionSnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a freshly fetched region document.
    pub fn replace(&self, regions: CustodianRegions) {
        let next = Arc::new(RegionSnapshot {
            regions,
            fetched_at: Some(Utc::now()),
        });
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Region verdict for `custodian`.
    ///
    /// `region_country` is matched against the region document; the static
    /// block list screens it together with `screened`. Empty codes are ignored.
    pub fn is_region_available(
        &self,
        custodian: ProviderKind,
        region_country: &str,
        screened: &[String],
    ) -> Result<(), LinkError> {
        if self.use_custodian_regions {
            if region_country.is_empty() {
                return Ok(());
            }
            let snapshot = self.snapshot();
            if snapshot
                .regions
                .for_custodian(custodian)
                .verdict(&[region_country])
            {
                return Ok(());
            }
            return Err(LinkError::InvalidCountry(region_country.to_ascii_uppercase()));
        }

        let blocked = std::iter::once(region_country)
            .chain(screened.iter().map(String::as_str))
            .filter(|c| !c.is_empty())
            .find(|c| self.blacklist.iter().any(|b| b.eq_ignore_ascii_case(c)));
        match blocked {
            Some(country) => Err(LinkError::InvalidCountry(country.to_ascii_uppercase())),
            None => Ok(()),
        }
    }

    /// Region verdict with grandfathering for accounts this wallet linked before.
    pub fn admit(
        &self,
        db: &LinkDatabase,
        wallet_id: Uuid,
        account: &VerifiedAccount,
    ) -> Result<(), LinkError> {
        match self.is_region_available(account.custodian, &account.country, &account.screened_countries) {
            Ok(()) => Ok(()),
            Err(LinkError::InvalidCountry(country)) => {
                if db.has_prior_linking(wallet_id, account.linking_id)? {
                    info!(
                        %wallet_id,
                        custodian = %account.custodian,
                        linking_id = %account.linking_id,
                        country = %country,
                        "region blocked but account was linked before, grandfathering"
                    );
                    Ok(())
                } else {
                    Err(LinkError::InvalidCountry(country))
                }
            }
            Err(other) => Err(other),
        }
    }
}

/// Background task that refreshes the region document.
pub struct RegionRefresher {
    gate: Arc<ComplianceGate>,
    source: Arc<dyn RegionSource>,
    interval: Duration,
}

impl RegionRefresher {
    pub fn new(gate: Arc<ComplianceGate>, source: Arc<dyn RegionSource>, interval: Duration) -> Self {
        Self {
            gate,
            source,
            interval,
        }
    }

    /// Run the refresh loop until the cancellation token is triggered.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Region refresher starting");

        loop {
            if shutdown.is_cancelled() {
                info!("Region refresher shutting down");
                return;
            }

            self.refresh_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Region refresher shutting down");
                    return;
                }
            }
        }
    }

    /// Fetch and install the document once. A failed fetch keeps the previous snapshot.
    pub async fn refresh_once(&self) -> bool {
        match self.source.fetch().await {
            Ok(regions) => {
                self.gate.replace(regions);
                info!("Region refresher: custodian regions updated");
                true
            }
            Err(e) => {
                warn!(error = %e, "Region refresher: fetch failed, keeping previous regions");
                false
            }
        }
    }
}
