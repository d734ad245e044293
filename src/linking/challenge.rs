// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Challenges
//!
//! Short-lived anti-replay nonces for signature-based linking. Each wallet
//! has at most one live challenge; creating a new one replaces it.
//!
//! A challenge expires five minutes after creation and is deleted when
//! consumed. [`ChallengeSweeper`] removes abandoned challenges and expired
//! bitFlyer request ids in the background.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::LinkError;
use crate::storage::{Challenge, LinkDatabase};

/// Lifetime of a challenge, in seconds.
pub const CHALLENGE_TTL_SECS: i64 = 5 * 60;

const NONCE_BYTES: usize = 32;

pub fn challenge_ttl() -> chrono::Duration {
    chrono::Duration::seconds(CHALLENGE_TTL_SECS)
}

pub struct ChallengeService {
    db: Arc<LinkDatabase>,
    rng: SystemRandom,
}

impl ChallengeService {
    pub fn new(db: Arc<LinkDatabase>) -> Self {
        Self {
            db,
            rng: SystemRandom::new(),
        }
    }

    /// Issue a fresh challenge for `wallet_id`, replacing any previous one.
    pub fn create(&self, wallet_id: Uuid) -> Result<Challenge, LinkError> {
        if self.db.get_wallet(wallet_id)?.is_none() {
            return Err(LinkError::WalletNotFound(wallet_id));
        }

        let mut bytes = [0u8; NONCE_BYTES];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| LinkError::Misconfigured("system random source unavailable".into()))?;

        let challenge = Challenge {
            wallet_id,
            nonce: hex::encode(bytes),
            created_at: Utc::now(),
        };
        self.db.upsert_challenge(&challenge)?;
        info!(%wallet_id, "challenge created");
        Ok(challenge)
    }

    /// The wallet's live challenge, without consuming it.
    pub fn live(&self, wallet_id: Uuid, now: DateTime<Utc>) -> Result<Challenge, LinkError> {
        let challenge = self
            .db
            .get_challenge(wallet_id)?
            .ok_or(LinkError::ChallengeNotFound)?;
        ensure_fresh(&challenge, now)?;
        Ok(challenge)
    }

    pub fn consume(&self, wallet_id: Uuid, nonce: &str) -> Result<(), LinkError> {
        self.consume_at(wallet_id, nonce, Utc::now())
    }

    /// Delete the challenge if it exists, matches `nonce` and is still live.
    pub fn consume_at(&self, wallet_id: Uuid, nonce: &str, now: DateTime<Utc>) -> Result<(), LinkError> {
        let challenge = self
            .db
            .take_challenge(wallet_id, nonce)?
            .ok_or(LinkError::ChallengeNotFound)?;
        ensure_fresh(&challenge, now)
    }

    /// Delete challenges older than `max_age`.
    pub fn sweep(&self, max_age: chrono::Duration) -> Result<usize, LinkError> {
        Ok(self.db.sweep_challenges(Utc::now() - max_age)?)
    }
}

fn ensure_fresh(challenge: &Challenge, now: DateTime<Utc>) -> Result<(), LinkError> {
    if now - challenge.created_at > challenge_ttl() {
        return Err(LinkError::ChallengeExpired);
    }
    Ok(())
}

/// Background task deleting stale challenges and bitFlyer request ids.
pub struct ChallengeSweeper {
    challenges: Arc<ChallengeService>,
    db: Arc<LinkDatabase>,
    interval: Duration,
    request_id_ttl: chrono::Duration,
}

impl ChallengeSweeper {
    pub fn new(
        challenges: Arc<ChallengeService>,
        db: Arc<LinkDatabase>,
        interval: Duration,
        request_id_ttl: chrono::Duration,
    ) -> Self {
        Self {
            challenges,
            db,
            interval,
            request_id_ttl,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// The sweep interval doubles as the maximum challenge age.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Challenge sweeper starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Challenge sweeper shutting down");
                    return;
                }
            }

            self.sweep_step();
        }
    }

    pub fn sweep_step(&self) {
        let max_age = chrono::Duration::from_std(self.interval).unwrap_or_else(|_| challenge_ttl());
        match self.challenges.sweep(max_age) {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "Challenge sweeper: removed stale challenges"),
            Err(e) => warn!(error = %e, "Challenge sweeper: challenge sweep failed"),
        }
        match self.db.sweep_request_ids(Utc::now() - self.request_id_ttl) {
            Ok(0) => {}
            Ok(n) => info!(removed = n, "Challenge sweeper: removed expired bitFlyer request ids"),
            Err(e) => warn!(error = %e, "Challenge sweeper: request id sweep failed"),
        }
    }
}
