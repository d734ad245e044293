// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::LinkingConfig;
use crate::linking::{ComplianceGate, LinkingService};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LinkingService>,
    pub gate: Arc<ComplianceGate>,
    pub config: Arc<LinkingConfig>,
}

impl AppState {
    pub fn new(service: Arc<LinkingService>, gate: Arc<ComplianceGate>, config: Arc<LinkingConfig>) -> Self {
        Self {
            service,
            gate,
            config,
        }
    }
}
