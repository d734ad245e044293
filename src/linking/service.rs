// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Linking entry points used by the HTTP layer.
//!
//! [`LinkingService::link`] runs one claim end to end: verify the proof,
//! screen the region, then hand the verified account to the coordinator.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::challenge::ChallengeService;
use super::compliance::ComplianceGate;
use super::coordinator::{LinkRequest, LinkingCoordinator, LinkingInfo};
use super::unlink::UnlinkCoordinator;
use super::LinkError;
use crate::clients::{GeminiApi, GeoCountryValidator, ReputationClient, UpholdApi};
use crate::config::LinkingConfig;
use crate::providers::{
    BitflyerVerifier, GeminiVerifier, LinkProof, ProviderKind, SolanaVerifier, UpholdVerifier,
    VerifiedAccount, VerifyLinkProof, ZebpayVerifier,
};
use crate::storage::{AllowListEntry, Challenge, LinkDatabase, WalletRecord};

/// Remote services the linking flow calls out to.
///
/// Custodian APIs are optional; a missing one makes that custodian answer
/// with a misconfiguration error.
pub struct Collaborators {
    pub reputation: Arc<dyn ReputationClient>,
    pub geo: Option<Arc<dyn GeoCountryValidator>>,
    pub gemini: Option<Arc<dyn GeminiApi>>,
    pub uphold: Option<Arc<dyn UpholdApi>>,
}

pub struct LinkingService {
    db: Arc<LinkDatabase>,
    config: Arc<LinkingConfig>,
    gate: Arc<ComplianceGate>,
    reputation: Arc<dyn ReputationClient>,
    challenges: Arc<ChallengeService>,
    coordinator: LinkingCoordinator,
    unlinker: UnlinkCoordinator,
    zebpay: ZebpayVerifier,
    gemini: GeminiVerifier,
    bitflyer: BitflyerVerifier,
    solana: SolanaVerifier,
    uphold: UpholdVerifier,
}

impl LinkingService {
    pub fn new(
        db: Arc<LinkDatabase>,
        config: Arc<LinkingConfig>,
        gate: Arc<ComplianceGate>,
        challenges: Arc<ChallengeService>,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            reputation,
            geo,
            gemini,
            uphold,
        } = collaborators;

        Self {
            coordinator: LinkingCoordinator::new(db.clone(), reputation.clone(), config.clone()),
            unlinker: UnlinkCoordinator::new(db.clone(), config.clone()),
            zebpay: ZebpayVerifier::new(config.providers.zebpay_linking_key.clone()),
            gemini: GeminiVerifier::new(gemini, db.clone()),
            bitflyer: BitflyerVerifier::new(config.providers.bitflyer_jwt_key.clone(), db.clone()),
            solana: SolanaVerifier::new(
                db.clone(),
                challenges.clone(),
                reputation.clone(),
                geo,
                config.solana_blocked_address_hashes.clone(),
            ),
            uphold: UpholdVerifier::new(uphold),
            db,
            config,
            gate,
            reputation,
            challenges,
        }
    }

    fn wallet(&self, wallet_id: Uuid) -> Result<WalletRecord, LinkError> {
        self.db
            .get_wallet(wallet_id)?
            .ok_or(LinkError::WalletNotFound(wallet_id))
    }

    async fn verify(&self, wallet: &WalletRecord, proof: &LinkProof) -> Result<VerifiedAccount, LinkError> {
        match proof {
            LinkProof::Zebpay(p) => self.zebpay.verify(wallet, p).await,
            LinkProof::Gemini(p) => self.gemini.verify(wallet, p).await,
            LinkProof::Bitflyer(p) => self.bitflyer.verify(wallet, p).await,
            LinkProof::Solana(p) => self.solana.verify(wallet, p).await,
            LinkProof::Uphold(p) => self.uphold.verify(wallet, p).await,
        }
    }

    /// Verify `proof` and link the account to the wallet. Returns the country.
    pub async fn link(&self, wallet_id: Uuid, proof: LinkProof) -> Result<String, LinkError> {
        let custodian = proof.kind();
        if self.config.is_disabled(custodian) {
            return Err(LinkError::LinkingDisabled(custodian));
        }
        let wallet = self.wallet(wallet_id)?;

        let account = self.verify(&wallet, &proof).await.inspect_err(|e| {
            info!(%wallet_id, %custodian, error = %e, code = e.error_code(), "proof rejected");
        })?;
        self.gate.admit(&self.db, wallet_id, &account)?;

        let country = self
            .coordinator
            .link(&LinkRequest::from_verified(wallet_id, &account))
            .await?;

        // The link is committed; summary updates are best effort.
        if let Err(e) = self.reputation.upsert_reputation_summary(wallet_id, &country).await {
            warn!(%wallet_id, error = %e, "failed to upsert reputation summary");
        }
        if let Err(e) = self.reputation.update_reputation_summary(wallet_id, true).await {
            warn!(%wallet_id, error = %e, "failed to mark wallet verified");
        }
        Ok(country)
    }

    pub async fn disconnect(&self, wallet_id: Uuid) -> Result<usize, LinkError> {
        self.unlinker.disconnect(wallet_id).await
    }

    pub async fn unlink(&self, wallet_id: Uuid, custodian: ProviderKind) -> Result<(), LinkError> {
        self.unlinker.unlink(wallet_id, custodian).await
    }

    pub fn create_challenge(&self, wallet_id: Uuid) -> Result<Challenge, LinkError> {
        self.challenges.create(wallet_id)
    }

    pub fn linking_info(&self, wallet_id: Uuid, custodian: ProviderKind) -> Result<LinkingInfo, LinkError> {
        self.wallet(wallet_id)?;
        self.coordinator.linking_info(wallet_id, custodian)
    }

    /// Register a wallet. `public_key` is the hex Ed25519 key it signs with.
    pub async fn register_wallet(
        &self,
        wallet_id: Uuid,
        public_key: &str,
        altcurrency: &str,
        geo_country: Option<&str>,
    ) -> Result<WalletRecord, LinkError> {
        let key = hex::decode(public_key)
            .map_err(|_| LinkError::InvalidInput("public key must be hex".into()))?;
        if key.len() != 32 {
            return Err(LinkError::InvalidInput("public key must be 32 bytes".into()));
        }
        if altcurrency.is_empty() {
            return Err(LinkError::InvalidInput("altcurrency is required".into()));
        }

        let wallet = WalletRecord::new(wallet_id, public_key.to_ascii_lowercase(), altcurrency);
        self.db.insert_wallet(&wallet)?;
        info!(%wallet_id, "wallet registered");

        if let Some(country) = geo_country.filter(|c| !c.is_empty()) {
            if let Err(e) = self
                .reputation
                .upsert_reputation_summary(wallet_id, &country.to_uppercase())
                .await
            {
                warn!(%wallet_id, error = %e, "failed to upsert reputation summary");
            }
        }
        Ok(wallet)
    }

    pub fn allow_list(&self, wallet_id: Uuid) -> Result<AllowListEntry, LinkError> {
        self.wallet(wallet_id)?;
        let entry = self.db.insert_allow_list(wallet_id)?;
        info!(%wallet_id, "wallet added to allow list");
        Ok(entry)
    }

    /// Grant one more fan-in slot to the account. Returns the slots granted so far.
    pub fn increase_linking_limit(&self, linking_id: Uuid) -> Result<u32, LinkError> {
        let extra = self.db.increase_linking_limit(linking_id)?;
        info!(%linking_id, extra, "linking limit increased");
        Ok(extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::linking::test_support::{open_db, FakeReputation};
    use crate::linking::ErrorKind;
    use crate::providers::ZebpayProof;
    use chrono::Utc;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    const ZEBPAY_KEY: &[u8] = b"zebpay";
    const WALLET_KEY: &str = "0a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223242526272829";

    struct Harness {
        _dir: tempfile::TempDir,
        db: Arc<LinkDatabase>,
        reputation: Arc<FakeReputation>,
        service: LinkingService,
    }

    fn harness(config: LinkingConfig) -> Harness {
        let (dir, db) = open_db();
        let config = Arc::new(config);
        let reputation = FakeReputation::new();
        let gate = Arc::new(ComplianceGate::new(&config.regions));
        let challenges = Arc::new(ChallengeService::new(db.clone()));
        let service = LinkingService::new(
            db.clone(),
            config,
            gate,
            challenges,
            Collaborators {
                reputation: reputation.clone(),
                geo: None,
                gemini: None,
                uphold: None,
            },
        );
        Harness {
            _dir: dir,
            db,
            reputation,
            service,
        }
    }

    fn zebpay_config() -> LinkingConfig {
        LinkingConfig {
            providers: ProviderConfig {
                zebpay_linking_key: Some(ZEBPAY_KEY.to_vec()),
                ..ProviderConfig::default()
            },
            ..LinkingConfig::default()
        }
    }

    fn zebpay_proof(account_id: &str) -> LinkProof {
        let now = Utc::now().timestamp();
        let claims = json!({
            "iat": now,
            "exp": now + 300,
            "depositId": format!("dep-{account_id}"),
            "accountId": account_id,
            "isValid": true,
            "countryCode": "IN",
        });
        LinkProof::Zebpay(ZebpayProof {
            linking_info: encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(ZEBPAY_KEY))
                .unwrap(),
        })
    }

    #[tokio::test]
    async fn zebpay_claim_links_wallet_and_updates_reputation() {
        let h = harness(zebpay_config());
        let wallet = h
            .service
            .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
            .await
            .unwrap();

        let country = h.service.link(wallet.id, zebpay_proof("zp-1")).await.unwrap();
        assert_eq!(country, "IN");

        let stored = h.db.get_wallet(wallet.id).unwrap().unwrap();
        assert_eq!(stored.user_deposit_account_provider, Some(ProviderKind::Zebpay));
        assert_eq!(stored.user_deposit_destination.as_deref(), Some("dep-zp-1"));
        assert_eq!(
            h.reputation.upserts.lock().unwrap().as_slice(),
            &[(wallet.id, "IN".to_string())]
        );
        assert_eq!(h.reputation.verified.lock().unwrap().as_slice(), &[(wallet.id, true)]);
    }

    #[tokio::test]
    async fn fifth_wallet_on_one_account_conflicts() {
        let h = harness(zebpay_config());
        for _ in 0..4 {
            let wallet = h
                .service
                .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
                .await
                .unwrap();
            h.service.link(wallet.id, zebpay_proof("shared")).await.unwrap();
        }

        let fifth = h
            .service
            .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
            .await
            .unwrap();
        let err = h.service.link(fifth.id, zebpay_proof("shared")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let info = h.service.linking_info(fifth.id, ProviderKind::Zebpay);
        assert!(matches!(info, Err(LinkError::NoActiveLink(_))));
    }

    #[tokio::test]
    async fn increased_limit_admits_another_wallet() {
        let h = harness(zebpay_config());
        let mut linking_id = None;
        for _ in 0..4 {
            let wallet = h
                .service
                .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
                .await
                .unwrap();
            h.service.link(wallet.id, zebpay_proof("shared")).await.unwrap();
            linking_id = h.db.get_wallet(wallet.id).unwrap().unwrap().provider_linking_id;
        }

        let extra = h.service.increase_linking_limit(linking_id.unwrap()).unwrap();
        assert_eq!(extra, 1);

        let fifth = h
            .service
            .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
            .await
            .unwrap();
        h.service.link(fifth.id, zebpay_proof("shared")).await.unwrap();
    }

    #[tokio::test]
    async fn disabled_custodian_is_rejected_before_verification() {
        let mut config = zebpay_config();
        config.disabled_custodians.insert(ProviderKind::Zebpay);
        let h = harness(config);
        let wallet = h
            .service
            .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
            .await
            .unwrap();

        let err = h.service.link(wallet.id, zebpay_proof("zp-1")).await.unwrap_err();
        assert!(matches!(err, LinkError::LinkingDisabled(ProviderKind::Zebpay)));
        assert_eq!(err.kind(), ErrorKind::Compliance);
    }

    #[tokio::test]
    async fn unknown_wallet_is_not_found() {
        let h = harness(zebpay_config());
        let err = h.service.link(Uuid::new_v4(), zebpay_proof("zp-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn missing_provider_config_is_internal() {
        let h = harness(LinkingConfig::default());
        let wallet = h
            .service
            .register_wallet(Uuid::new_v4(), WALLET_KEY, "BAT", None)
            .await
            .unwrap();
        let err = h.service.link(wallet.id, zebpay_proof("zp-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn register_wallet_validates_and_seeds_reputation() {
        let h = harness(LinkingConfig::default());
        assert!(matches!(
            h.service.register_wallet(Uuid::new_v4(), "zz", "BAT", None).await,
            Err(LinkError::InvalidInput(_))
        ));

        let id = Uuid::new_v4();
        h.service
            .register_wallet(id, WALLET_KEY, "BAT", Some("fr"))
            .await
            .unwrap();
        assert_eq!(
            h.reputation.upserts.lock().unwrap().as_slice(),
            &[(id, "FR".to_string())]
        );

        let err = h
            .service
            .register_wallet(id, WALLET_KEY, "BAT", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn allow_list_requires_wallet() {
        let h = harness(LinkingConfig::default());
        assert!(matches!(
            h.service.allow_list(Uuid::new_v4()),
            Err(LinkError::WalletNotFound(_))
        ));
    }
}
