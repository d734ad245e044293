// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Link Storage
//!
//! Persistence for wallets, custodian links, challenges, allow-list entries,
//! linking-limit adjustments and the bitFlyer request-id replay cache.
//!
//! ## Layout
//!
//! ```text
//! {DATA_DIR}/linking.redb
//!   wallets               wallet_id -> WalletRecord
//!   custodian_links       linking_id|custodian|wallet_id -> CustodianLink
//!   wallet_links          wallet_id|custodian|linking_id -> custodian_links key
//!   challenges            wallet_id -> Challenge
//!   allow_list            wallet_id -> AllowListEntry
//!   linking_limit_adjust  linking_id -> extra slots
//!   bitflyer_request_ids  request_id -> consumed at (unix seconds)
//! ```
//!
//! Multi-row changes go through [`LinkTx`], which holds the advisory locks
//! for the change and commits everything in one redb write transaction.

pub mod advisory;
pub mod link_db;
pub mod records;
pub mod scoped;

pub use advisory::{AdvisoryGuard, AdvisoryLocks, LockKey};
pub use link_db::{LinkDatabase, StorageError, StorageResult};
pub use records::{AllowListEntry, Challenge, CustodianLink, WalletLinking, WalletRecord};
pub use scoped::LinkTx;
