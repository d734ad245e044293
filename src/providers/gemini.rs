// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Gemini linking tokens.
//!
//! The token is exchanged with Gemini for the account and its verified
//! identity documents. The country comes from the documents, not from the
//! account's self-declared country code.

use std::sync::Arc;

use async_trait::async_trait;

use super::{linking_id_for, ProviderKind, VerifiedAccount, VerifyLinkProof};
use crate::clients::{GeminiAccount, GeminiApi};
use crate::linking::LinkError;
use crate::storage::{LinkDatabase, WalletRecord};

/// Document types accepted for country resolution, most trusted first.
pub const DOCUMENT_PRECEDENCE: [&str; 4] = [
    "passport",
    "drivers_license",
    "national_identity_card",
    "passport_card",
];

#[derive(Debug, Clone)]
pub struct GeminiProof {
    pub linking_info: String,
    pub recipient_id: String,
}

/// Resolve the account's country from its identity documents.
///
/// The first document type in [`DOCUMENT_PRECEDENCE`] present on the account
/// wins, whatever the order Gemini returned them in. With no accepted
/// document, `fallback` selects the legacy account country; otherwise the
/// result is empty.
pub fn resolve_country(account: &GeminiAccount, fallback: bool) -> String {
    DOCUMENT_PRECEDENCE
        .iter()
        .find_map(|wanted| {
            account
                .valid_documents
                .iter()
                .find(|doc| doc.doc_type.eq_ignore_ascii_case(wanted))
        })
        .map(|doc| doc.issuing_country.to_uppercase())
        .unwrap_or_else(|| {
            if fallback {
                account.country_code.to_uppercase()
            } else {
                String::new()
            }
        })
}

pub struct GeminiVerifier {
    api: Option<Arc<dyn GeminiApi>>,
    db: Arc<LinkDatabase>,
}

impl GeminiVerifier {
    pub fn new(api: Option<Arc<dyn GeminiApi>>, db: Arc<LinkDatabase>) -> Self {
        Self { api, db }
    }
}

#[async_trait]
impl VerifyLinkProof for GeminiVerifier {
    type Proof = GeminiProof;

    async fn verify(
        &self,
        caller: &WalletRecord,
        proof: &GeminiProof,
    ) -> Result<VerifiedAccount, LinkError> {
        let api = self
            .api
            .as_ref()
            .ok_or_else(|| LinkError::Misconfigured("GEMINI_SERVER is not set".into()))?;
        if proof.recipient_id.is_empty() {
            return Err(LinkError::InvalidDepositId);
        }

        let account = api
            .validate_account(&proof.linking_info, &proof.recipient_id)
            .await?;
        if account.id.is_empty() {
            return Err(LinkError::InvalidAccountId);
        }

        // Re-authenticating the account already linked keeps the legacy country.
        let linking_id = linking_id_for(&account.id);
        let fallback = self
            .db
            .active_link(caller.id, ProviderKind::Gemini)?
            .is_some_and(|link| link.linking_id == linking_id);

        let country = resolve_country(&account, fallback);
        Ok(VerifiedAccount::new(
            ProviderKind::Gemini,
            account.id,
            proof.recipient_id.clone(),
            country,
        ))
    }
}
