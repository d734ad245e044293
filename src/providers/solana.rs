// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Solana self-custody addresses.
//!
//! The wallet proves control of a Solana address by signing a three-line
//! message with the Solana key. The third line carries a companion
//! signature made with the wallet's own Ed25519 key over
//! `<wallet_id>.<nonce>`, where the nonce is the wallet's live challenge.
//!
//! ```text
//! Rewards ID: <wallet_id>
//! Solana address: <base58 public key>
//! Nonce: <wallet_id>.<nonce>.<base64url companion signature>
//! ```
//!
//! Only allow-listed wallets may link an address. The region comes from
//! the wallet's reputation summary.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use ring::signature::{UnparsedPublicKey, ED25519};
use sha2::{Digest, Sha256};
use tracing::warn;

use super::{ProviderKind, VerifiedAccount, VerifyLinkProof};
use crate::clients::{GeoCountryValidator, ReputationClient};
use crate::linking::challenge::ChallengeService;
use crate::linking::LinkError;
use crate::storage::{LinkDatabase, WalletRecord};

#[derive(Debug, Clone)]
pub struct SolanaProof {
    /// Base58 Ed25519 public key, which is also the Solana address.
    pub solana_public_key: String,
    pub message: String,
    /// Base64url signature of `message` by the Solana key.
    pub solana_signature: String,
}

/// Fields carried by a linking message.
#[derive(Debug, PartialEq, Eq)]
struct LinkingMessage<'a> {
    wallet_id: &'a str,
    address: &'a str,
    nonce_wallet_id: &'a str,
    nonce: &'a str,
    companion_signature: &'a str,
}

fn line_value(line: &str) -> &str {
    line.rsplit_once(':').map_or(line, |(_, value)| value).trim()
}

fn parse_message(message: &str) -> Result<LinkingMessage<'_>, LinkError> {
    let mut lines = message.lines().map(str::trim).filter(|l| !l.is_empty());
    let (Some(first), Some(second), Some(third), None) =
        (lines.next(), lines.next(), lines.next(), lines.next())
    else {
        return Err(LinkError::MalformedMessage("expected three lines".into()));
    };

    let mut parts = line_value(third).splitn(3, '.');
    let (Some(nonce_wallet_id), Some(nonce), Some(companion_signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(LinkError::MalformedMessage(
            "nonce line must be <wallet>.<nonce>.<signature>".into(),
        ));
    };

    Ok(LinkingMessage {
        wallet_id: line_value(first),
        address: line_value(second),
        nonce_wallet_id,
        nonce,
        companion_signature,
    })
}

/// Decode base64url with or without padding.
fn decode_signature(encoded: &str, which: &'static str) -> Result<Vec<u8>, LinkError> {
    Base64UrlUnpadded::decode_vec(encoded.trim_end_matches('='))
        .map_err(|_| LinkError::InvalidSignature(which))
}

fn verify_ed25519(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
    which: &'static str,
) -> Result<(), LinkError> {
    UnparsedPublicKey::new(&ED25519, public_key)
        .verify(message, signature)
        .map_err(|_| LinkError::InvalidSignature(which))
}

/// Hex SHA-256 of an address, the form the block list is kept in.
pub fn address_hash(address: &str) -> String {
    hex::encode(Sha256::digest(address.as_bytes()))
}

pub struct SolanaVerifier {
    db: Arc<LinkDatabase>,
    challenges: Arc<ChallengeService>,
    reputation: Arc<dyn ReputationClient>,
    geo: Option<Arc<dyn GeoCountryValidator>>,
    blocked_address_hashes: HashSet<String>,
}

impl SolanaVerifier {
    pub fn new(
        db: Arc<LinkDatabase>,
        challenges: Arc<ChallengeService>,
        reputation: Arc<dyn ReputationClient>,
        geo: Option<Arc<dyn GeoCountryValidator>>,
        blocked_address_hashes: HashSet<String>,
    ) -> Self {
        Self {
            db,
            challenges,
            reputation,
            geo,
            blocked_address_hashes,
        }
    }

    async fn resolve_country(&self, caller: &WalletRecord) -> Result<String, LinkError> {
        let geo = self
            .geo
            .as_ref()
            .ok_or_else(|| LinkError::Misconfigured("GEO_VALIDATOR_SERVER is not set".into()))?;

        let summary = self
            .reputation
            .get_reputation_summary(caller.id)
            .await
            .map_err(|e| {
                warn!(wallet_id = %caller.id, error = %e, "reputation summary lookup failed");
                LinkError::Unavailable("reputation".into())
            })?;
        let country = summary.geo_country.to_uppercase();

        let allowed = geo
            .validate(&country)
            .await
            .map_err(|e| {
                warn!(wallet_id = %caller.id, error = %e, "geo validation failed");
                LinkError::Unavailable("geo validation".into())
            })?;
        if !allowed {
            return Err(LinkError::InvalidCountry(country));
        }
        Ok(country)
    }
}

#[async_trait]
impl VerifyLinkProof for SolanaVerifier {
    type Proof = SolanaProof;

    async fn verify(
        &self,
        caller: &WalletRecord,
        proof: &SolanaProof,
    ) -> Result<VerifiedAccount, LinkError> {
        if self.db.get_allow_list(caller.id)?.is_none() {
            return Err(LinkError::NotAllowListed);
        }
        let challenge = self.challenges.live(caller.id, Utc::now())?;

        let wallet_id = caller.id.to_string();
        let message = parse_message(&proof.message)?;
        if message.wallet_id != wallet_id || message.nonce_wallet_id != wallet_id {
            return Err(LinkError::WalletMismatch);
        }
        if message.address != proof.solana_public_key {
            return Err(LinkError::MalformedMessage("address does not match public key".into()));
        }
        if message.nonce != challenge.nonce {
            return Err(LinkError::ChallengeNotFound);
        }

        let wallet_key = hex::decode(&caller.public_key)
            .map_err(|_| LinkError::Misconfigured(format!("wallet {wallet_id} has a malformed key")))?;
        let companion = decode_signature(message.companion_signature, "wallet")?;
        verify_ed25519(
            &wallet_key,
            format!("{wallet_id}.{}", challenge.nonce).as_bytes(),
            &companion,
            "wallet",
        )?;

        let solana_key = bs58::decode(&proof.solana_public_key)
            .into_vec()
            .map_err(|_| LinkError::InvalidSignature("solana"))?;
        let outer = decode_signature(&proof.solana_signature, "solana")?;
        verify_ed25519(&solana_key, proof.message.as_bytes(), &outer, "solana")?;

        if self
            .blocked_address_hashes
            .contains(&address_hash(&proof.solana_public_key))
        {
            warn!(wallet_id = %caller.id, "blocked solana address");
            return Err(LinkError::AddressBlocked);
        }

        let country = self.resolve_country(caller).await?;

        self.challenges.consume(caller.id, &challenge.nonce)?;

        Ok(VerifiedAccount::new(
            ProviderKind::Solana,
            proof.solana_public_key.clone(),
            proof.solana_public_key.clone(),
            country,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ClientError;
    use crate::linking::test_support::{open_db, FakeReputation};
    use crate::storage::Challenge;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use uuid::Uuid;

    struct FakeGeo(bool);

    #[async_trait]
    impl GeoCountryValidator for FakeGeo {
        async fn validate(&self, _country: &str) -> Result<bool, ClientError> {
            Ok(self.0)
        }
    }

    fn keypair() -> Ed25519KeyPair {
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&SystemRandom::new()).unwrap();
        Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        db: Arc<LinkDatabase>,
        challenges: Arc<ChallengeService>,
        wallet: WalletRecord,
        wallet_key: Ed25519KeyPair,
        solana_key: Ed25519KeyPair,
    }

    impl Fixture {
        fn new() -> Self {
            let (dir, db) = open_db();
            let wallet_key = keypair();
            let wallet = WalletRecord::new(
                Uuid::new_v4(),
                hex::encode(wallet_key.public_key().as_ref()),
                "BAT",
            );
            db.insert_wallet(&wallet).unwrap();
            db.insert_allow_list(wallet.id).unwrap();
            Self {
                challenges: Arc::new(ChallengeService::new(db.clone())),
                db,
                _dir: dir,
                wallet,
                wallet_key,
                solana_key: keypair(),
            }
        }

        fn address(&self) -> String {
            bs58::encode(self.solana_key.public_key().as_ref()).into_string()
        }

        fn verifier(&self, geo_allowed: bool, blocked: HashSet<String>) -> SolanaVerifier {
            let geo: Arc<dyn GeoCountryValidator> = Arc::new(FakeGeo(geo_allowed));
            SolanaVerifier::new(
                self.db.clone(),
                self.challenges.clone(),
                FakeReputation::new(),
                Some(geo),
                blocked,
            )
        }

        fn proof_with(&self, nonce: &str, companion_key: &Ed25519KeyPair) -> SolanaProof {
            let wallet_id = self.wallet.id;
            let companion = companion_key.sign(format!("{wallet_id}.{nonce}").as_bytes());
            let message = format!(
                "Rewards ID: {wallet_id}\nSolana address: {}\nNonce: {wallet_id}.{nonce}.{}",
                self.address(),
                Base64UrlUnpadded::encode_string(companion.as_ref()),
            );
            let signature = self.solana_key.sign(message.as_bytes());
            SolanaProof {
                solana_public_key: self.address(),
                message,
                solana_signature: Base64UrlUnpadded::encode_string(signature.as_ref()),
            }
        }

        fn proof(&self, nonce: &str) -> SolanaProof {
            self.proof_with(nonce, &self.wallet_key)
        }
    }

    #[test]
    fn parses_message_lines() {
        let parsed = parse_message("Rewards ID: w\nSolana address: addr\nNonce: w.n.c2ln").unwrap();
        assert_eq!(
            parsed,
            LinkingMessage {
                wallet_id: "w",
                address: "addr",
                nonce_wallet_id: "w",
                nonce: "n",
                companion_signature: "c2ln",
            }
        );
        assert!(parse_message("Rewards ID: w\nSolana address: addr").is_err());
        assert!(parse_message("a: w\nb: addr\nc: w.n").is_err());
    }

    #[tokio::test]
    async fn valid_proof_links_address_and_consumes_challenge() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();
        let verifier = f.verifier(true, HashSet::new());
        let proof = f.proof(&challenge.nonce);

        let account = verifier.verify(&f.wallet, &proof).await.unwrap();
        assert_eq!(account.custodian, ProviderKind::Solana);
        assert_eq!(account.external_account_id, f.address());
        assert_eq!(account.deposit_destination, f.address());
        assert_eq!(account.country, "US");

        assert!(matches!(
            verifier.verify(&f.wallet, &proof).await,
            Err(LinkError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn expired_challenge_is_rejected() {
        let f = Fixture::new();
        f.db.upsert_challenge(&Challenge {
            wallet_id: f.wallet.id,
            nonce: "stale".into(),
            created_at: Utc::now() - chrono::Duration::minutes(6),
        })
        .unwrap();

        let err = f
            .verifier(true, HashSet::new())
            .verify(&f.wallet, &f.proof("stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::ChallengeExpired));
    }

    #[tokio::test]
    async fn wallet_must_be_allow_listed() {
        let f = Fixture::new();
        let other = WalletRecord::new(Uuid::new_v4(), f.wallet.public_key.clone(), "BAT");
        f.db.insert_wallet(&other).unwrap();

        let err = f
            .verifier(true, HashSet::new())
            .verify(&other, &f.proof("nonce"))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::NotAllowListed));
    }

    #[tokio::test]
    async fn companion_signature_must_come_from_wallet_key() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();
        let impostor = keypair();

        let err = f
            .verifier(true, HashSet::new())
            .verify(&f.wallet, &f.proof_with(&challenge.nonce, &impostor))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidSignature("wallet")));
        assert!(f.db.get_challenge(f.wallet.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn tampered_message_fails_outer_signature() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();
        let mut proof = f.proof(&challenge.nonce);
        proof.message.push('\n');

        let err = f
            .verifier(true, HashSet::new())
            .verify(&f.wallet, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidSignature("solana")));
    }

    #[tokio::test]
    async fn blocked_address_is_rejected() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();
        let blocked = HashSet::from([address_hash(&f.address())]);

        let err = f
            .verifier(true, blocked)
            .verify(&f.wallet, &f.proof(&challenge.nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::AddressBlocked));
    }

    #[tokio::test]
    async fn disallowed_region_is_rejected() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();

        let err = f
            .verifier(false, HashSet::new())
            .verify(&f.wallet, &f.proof(&challenge.nonce))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidCountry(ref c) if c == "US"));
    }

    #[tokio::test]
    async fn message_for_another_wallet_is_rejected() {
        let f = Fixture::new();
        let challenge = f.challenges.create(f.wallet.id).unwrap();
        let mut proof = f.proof(&challenge.nonce);
        proof.message = proof
            .message
            .replacen(&f.wallet.id.to_string(), &Uuid::new_v4().to_string(), 1);

        let err = f
            .verifier(true, HashSet::new())
            .verify(&f.wallet, &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::WalletMismatch));
    }
}
