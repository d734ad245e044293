// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! ZebPay linking claims.
//!
//! ZebPay hands the user an HS256 claim set signed with a shared key. The
//! checks run in a fixed order so each failure has its own error.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{decode_hs256, ProviderKind, VerifiedAccount, VerifyLinkProof};
use crate::linking::LinkError;
use crate::storage::WalletRecord;

/// Only country ZebPay linking is offered in.
pub const SUPPORTED_COUNTRY: &str = "IN";

#[derive(Debug, Clone)]
pub struct ZebpayProof {
    /// Signed claim set, compact JWS.
    pub linking_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZebpayClaims {
    iat: Option<i64>,
    exp: Option<i64>,
    #[serde(default)]
    deposit_id: String,
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    is_valid: bool,
    #[serde(default)]
    country_code: String,
}

pub struct ZebpayVerifier {
    key: Option<Vec<u8>>,
}

impl ZebpayVerifier {
    pub fn new(key: Option<Vec<u8>>) -> Self {
        Self { key }
    }
}

#[async_trait]
impl VerifyLinkProof for ZebpayVerifier {
    type Proof = ZebpayProof;

    async fn verify(
        &self,
        _caller: &WalletRecord,
        proof: &ZebpayProof,
    ) -> Result<VerifiedAccount, LinkError> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| LinkError::Misconfigured("ZEBPAY_LINKING_KEY is not set".into()))?;
        let claims: ZebpayClaims = decode_hs256(&proof.linking_info, key)?;

        let iat = claims.iat.ok_or(LinkError::InvalidIat)?;
        let exp = claims.exp.ok_or(LinkError::InvalidExp)?;
        let now = Utc::now().timestamp();
        if now < iat {
            return Err(LinkError::TokenNotYetValid);
        }
        if now > exp {
            return Err(LinkError::TokenExpired);
        }
        if !claims.is_valid {
            return Err(LinkError::InvalidKyc);
        }
        if claims.deposit_id.is_empty() {
            return Err(LinkError::InvalidDepositId);
        }
        if claims.account_id.is_empty() {
            return Err(LinkError::InvalidAccountId);
        }
        if !claims.country_code.eq_ignore_ascii_case(SUPPORTED_COUNTRY) {
            return Err(LinkError::InvalidCountry(claims.country_code.to_uppercase()));
        }

        Ok(VerifiedAccount::new(
            ProviderKind::Zebpay,
            claims.account_id,
            claims.deposit_id,
            claims.country_code,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};
    use uuid::Uuid;

    const KEY: &[u8] = b"zebpay-linking-key";

    fn caller() -> WalletRecord {
        WalletRecord::new(Uuid::new_v4(), "key", "BAT")
    }

    fn claims() -> Value {
        let now = Utc::now().timestamp();
        json!({
            "iat": now - 10,
            "exp": now + 300,
            "depositId": "dep-1",
            "accountId": "acct-1",
            "isValid": true,
            "countryCode": "IN",
        })
    }

    fn sign(claims: &Value, alg: Algorithm) -> ZebpayProof {
        ZebpayProof {
            linking_info: encode(&Header::new(alg), claims, &EncodingKey::from_secret(KEY)).unwrap(),
        }
    }

    async fn verify(claims: Value) -> Result<VerifiedAccount, LinkError> {
        ZebpayVerifier::new(Some(KEY.to_vec()))
            .verify(&caller(), &sign(&claims, Algorithm::HS256))
            .await
    }

    #[tokio::test]
    async fn valid_claims_produce_account() {
        let account = verify(claims()).await.unwrap();
        assert_eq!(account.custodian, ProviderKind::Zebpay);
        assert_eq!(account.external_account_id, "acct-1");
        assert_eq!(account.deposit_destination, "dep-1");
        assert_eq!(account.country, "IN");
    }

    #[tokio::test]
    async fn other_algorithms_are_rejected() {
        let proof = sign(&claims(), Algorithm::HS512);
        let err = ZebpayVerifier::new(Some(KEY.to_vec()))
            .verify(&caller(), &proof)
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn wrong_key_is_rejected() {
        let err = ZebpayVerifier::new(Some(b"other".to_vec()))
            .verify(&caller(), &sign(&claims(), Algorithm::HS256))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn missing_timestamps_are_named() {
        let mut c = claims();
        c.as_object_mut().unwrap().remove("iat");
        assert!(matches!(verify(c).await, Err(LinkError::InvalidIat)));

        let mut c = claims();
        c.as_object_mut().unwrap().remove("exp");
        assert!(matches!(verify(c).await, Err(LinkError::InvalidExp)));
    }

    #[tokio::test]
    async fn expired_claims_fail_even_when_valid() {
        let mut c = claims();
        c["exp"] = json!(Utc::now().timestamp() - 60);
        assert!(matches!(verify(c).await, Err(LinkError::TokenExpired)));

        let mut c = claims();
        c["iat"] = json!(Utc::now().timestamp() + 600);
        assert!(matches!(verify(c).await, Err(LinkError::TokenNotYetValid)));
    }

    #[tokio::test]
    async fn kyc_failure_always_fails() {
        let mut c = claims();
        c["isValid"] = json!(false);
        assert!(matches!(verify(c).await, Err(LinkError::InvalidKyc)));
    }

    #[tokio::test]
    async fn empty_ids_are_rejected() {
        let mut c = claims();
        c["depositId"] = json!("");
        assert!(matches!(verify(c).await, Err(LinkError::InvalidDepositId)));

        let mut c = claims();
        c["accountId"] = json!("");
        assert!(matches!(verify(c).await, Err(LinkError::InvalidAccountId)));
    }

    #[tokio::test]
    async fn unsupported_country_is_rejected() {
        let mut c = claims();
        c["countryCode"] = json!("US");
        assert!(matches!(
            verify(c).await,
            Err(LinkError::InvalidCountry(ref country)) if country == "US"
        ));
    }

    #[tokio::test]
    async fn missing_key_is_misconfiguration() {
        let err = ZebpayVerifier::new(None)
            .verify(&caller(), &sign(&claims(), Algorithm::HS256))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::linking::ErrorKind::Internal);
    }
}
