// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Custodian Link Server - deposit account linking for rewards wallets
//!
//! Links wallets to deposit accounts at external custodians (Uphold, Gemini,
//! bitFlyer, ZebPay) and to self-custodied Solana addresses, while capping
//! how many wallets may share one external account.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Wallet binding and admin token extractors
//! - `clients` - Reputation, geo, custodian and region document clients
//! - `linking` - Linking coordinator, compliance gate, challenges, unlink
//! - `providers` - Per-custodian proof verifiers
//! - `storage` - redb link database with advisory locks

pub mod api;
pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod linking;
pub mod models;
pub mod providers;
pub mod state;
pub mod storage;
