// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for linking tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use crate::clients::reputation::COHORT_OK;
use crate::clients::{ClientError, LinkingVerdict, ReputationClient, ReputationSummary};
use crate::storage::{LinkDatabase, WalletRecord};

pub fn open_db() -> (tempfile::TempDir, Arc<LinkDatabase>) {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(LinkDatabase::open(&dir.path().join("test.redb")).unwrap());
    (dir, db)
}

pub fn register_wallet(db: &LinkDatabase) -> WalletRecord {
    let wallet = WalletRecord::new(Uuid::new_v4(), "ab".repeat(32), "BAT");
    db.insert_wallet(&wallet).unwrap();
    wallet
}

/// In-memory reputation service.
pub struct FakeReputation {
    pub cohorts: Mutex<Vec<i32>>,
    pub geo_country: Mutex<String>,
    pub unavailable: AtomicBool,
    pub upserts: Mutex<Vec<(Uuid, String)>>,
    pub verified: Mutex<Vec<(Uuid, bool)>>,
}

impl FakeReputation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cohorts: Mutex::new(vec![COHORT_OK]),
            geo_country: Mutex::new("US".into()),
            unavailable: AtomicBool::new(false),
            upserts: Mutex::new(Vec::new()),
            verified: Mutex::new(Vec::new()),
        })
    }

    pub fn set_cohorts(&self, cohorts: Vec<i32>) {
        *self.cohorts.lock().unwrap() = cohorts;
    }

    fn check(&self) -> Result<(), ClientError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ClientError::Status {
                method: reqwest::Method::GET,
                path: "v2/reputation".into(),
                status: 503,
                body: String::new(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ReputationClient for FakeReputation {
    async fn is_linking_reputable(
        &self,
        _wallet_id: Uuid,
        _country: &str,
    ) -> Result<LinkingVerdict, ClientError> {
        self.check()?;
        Ok(LinkingVerdict {
            cohorts: self.cohorts.lock().unwrap().clone(),
        })
    }

    async fn get_reputation_summary(&self, _wallet_id: Uuid) -> Result<ReputationSummary, ClientError> {
        self.check()?;
        Ok(ReputationSummary {
            geo_country: self.geo_country.lock().unwrap().clone(),
        })
    }

    async fn upsert_reputation_summary(&self, wallet_id: Uuid, geo_country: &str) -> Result<(), ClientError> {
        self.check()?;
        self.upserts
            .lock()
            .unwrap()
            .push((wallet_id, geo_country.to_string()));
        Ok(())
    }

    async fn update_reputation_summary(&self, wallet_id: Uuid, verified_wallet: bool) -> Result<(), ClientError> {
        self.check()?;
        self.verified.lock().unwrap().push((wallet_id, verified_wallet));
        Ok(())
    }
}
