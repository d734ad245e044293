// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custodian Linking
//!
//! Links rewards wallets to deposit accounts at external custodians.
//!
//! ```text
//! LinkingService::link(wallet, proof)
//!   -> provider verifier        (providers/)
//!   -> ComplianceGate::admit    region verdict + grandfathering
//!   -> LinkingCoordinator::link advisory lock, fan-in, reputation, commit
//! ```
//!
//! [`UnlinkCoordinator`] handles disconnect and operator unlink;
//! [`ChallengeService`] issues the nonces the Solana flow signs.

pub mod challenge;
pub mod compliance;
pub mod coordinator;
pub mod error;
pub mod service;
pub mod unlink;

#[cfg(test)]
pub(crate) mod test_support;

pub use challenge::{ChallengeService, ChallengeSweeper};
pub use compliance::{ComplianceGate, RegionRefresher};
pub use coordinator::{LinkRequest, LinkingCoordinator, LinkingInfo};
pub use error::{ErrorKind, LinkError};
pub use service::{Collaborators, LinkingService};
pub use unlink::UnlinkCoordinator;
