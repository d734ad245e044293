// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Uphold signed linking transactions.
//!
//! The wallet signs a linking transaction addressed to its Uphold card;
//! Uphold checks it and answers with the member behind the card. Region
//! screening, including grandfathering of accounts linked before a block,
//! happens in the compliance gate.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ProviderKind, VerifiedAccount, VerifyLinkProof};
use crate::clients::UpholdApi;
use crate::linking::LinkError;
use crate::storage::WalletRecord;

#[derive(Debug, Clone)]
pub struct UpholdProof {
    pub signed_linking_request: String,
    /// Anonymous card address the wallet reports alongside the link.
    pub anonymous_address: Option<Uuid>,
}

pub struct UpholdVerifier {
    api: Option<Arc<dyn UpholdApi>>,
}

impl UpholdVerifier {
    pub fn new(api: Option<Arc<dyn UpholdApi>>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl VerifyLinkProof for UpholdVerifier {
    type Proof = UpholdProof;

    async fn verify(
        &self,
        _caller: &WalletRecord,
        proof: &UpholdProof,
    ) -> Result<VerifiedAccount, LinkError> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| LinkError::Misconfigured("UPHOLD_SERVER is not set".into()))?;
        if proof.signed_linking_request.is_empty() {
            return Err(LinkError::InvalidInput("signed linking request is empty".into()));
        }

        let result = api.submit_linking_request(&proof.signed_linking_request).await?;
        if !result.is_member {
            return Err(LinkError::InvalidKyc);
        }
        if result.user_id.is_empty() {
            return Err(LinkError::InvalidAccountId);
        }
        if result.destination.is_empty() {
            return Err(LinkError::InvalidDepositId);
        }

        let mut account = VerifiedAccount::new(
            ProviderKind::Uphold,
            result.user_id,
            result.destination,
            result.identity_country,
        );
        account.screened_countries = [result.citizenship_country, result.residence_country]
            .into_iter()
            .filter(|c| !c.is_empty())
            .map(|c| c.to_uppercase())
            .collect();
        account.anonymous_address = proof.anonymous_address;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ClientError, UpholdLinkingResult};
    use crate::linking::compliance::ComplianceGate;
    use crate::linking::test_support::{open_db, register_wallet};
    use crate::config::RegionConfig;
    use crate::providers::linking_id_for;
    use crate::storage::{CustodianLink, LockKey};
    use chrono::Utc;

    struct FakeUphold(Result<UpholdLinkingResult, u16>);

    #[async_trait]
    impl UpholdApi for FakeUphold {
        async fn submit_linking_request(&self, _signed: &str) -> Result<UpholdLinkingResult, ClientError> {
            self.0.clone().map_err(|status| ClientError::Status {
                method: reqwest::Method::POST,
                path: "v0/me/linking".into(),
                status,
                body: String::new(),
            })
        }
    }

    fn member(country: &str) -> UpholdLinkingResult {
        UpholdLinkingResult {
            user_id: "uphold-user".into(),
            is_member: true,
            identity_country: country.into(),
            citizenship_country: "de".into(),
            residence_country: String::new(),
            destination: "card-1".into(),
        }
    }

    fn verifier(result: Result<UpholdLinkingResult, u16>) -> UpholdVerifier {
        let api: Arc<dyn UpholdApi> = Arc::new(FakeUphold(result));
        UpholdVerifier::new(Some(api))
    }

    fn proof() -> UpholdProof {
        UpholdProof {
            signed_linking_request: "signed".into(),
            anonymous_address: Some(Uuid::new_v4()),
        }
    }

    fn caller() -> WalletRecord {
        WalletRecord::new(Uuid::new_v4(), "key", "BAT")
    }

    #[tokio::test]
    async fn member_resolves_identity_country() {
        let p = proof();
        let account = verifier(Ok(member("us"))).verify(&caller(), &p).await.unwrap();
        assert_eq!(account.country, "US");
        assert_eq!(account.screened_countries, vec!["DE".to_string()]);
        assert_eq!(account.deposit_destination, "card-1");
        assert_eq!(account.anonymous_address, p.anonymous_address);
        assert_eq!(account.linking_id, linking_id_for("uphold-user"));
    }

    #[tokio::test]
    async fn non_member_fails_kyc() {
        let mut result = member("US");
        result.is_member = false;
        assert!(matches!(
            verifier(Ok(result)).verify(&caller(), &proof()).await,
            Err(LinkError::InvalidKyc)
        ));
    }

    #[tokio::test]
    async fn upstream_outage_is_transient() {
        let err = verifier(Err(502)).verify(&caller(), &proof()).await.unwrap_err();
        assert_eq!(err.kind(), crate::linking::ErrorKind::Transient);

        let err = verifier(Err(400)).verify(&caller(), &proof()).await.unwrap_err();
        assert_eq!(err.kind(), crate::linking::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn blocked_country_is_grandfathered_for_prior_account() {
        let (_dir, db) = open_db();
        let wallet = register_wallet(&db);
        let gate = ComplianceGate::new(&RegionConfig {
            blacklisted_countries: vec!["CU".into()],
            ..RegionConfig::default()
        });
        let account = verifier(Ok(member("CU"))).verify(&wallet, &proof()).await.unwrap();

        assert!(matches!(
            gate.admit(&db, wallet.id, &account),
            Err(LinkError::InvalidCountry(_))
        ));

        let mut tx = db.begin(&[LockKey::Linking(account.linking_id)]).await;
        let mut prior = CustodianLink::new(wallet.id, ProviderKind::Uphold, account.linking_id, "US", Utc::now());
        prior.disconnected_at = Some(Utc::now());
        tx.put_link(prior);
        tx.commit().unwrap();

        gate.admit(&db, wallet.id, &account).unwrap();
    }
}
