// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::ClientError;

/// Statuses that will not change on retry.
const NON_RETRIABLE_STATUSES: [u16; 5] = [400, 401, 403, 409, 500];

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn is_retriable(err: &ClientError) -> bool {
        match err {
            ClientError::Status { status, .. } => !NON_RETRIABLE_STATUSES.contains(status),
            ClientError::Request { .. } => true,
            ClientError::MissingConfig(_) | ClientError::InvalidResponse(_) => false,
        }
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && Self::is_retriable(&err) => {
                    warn!(what, attempt, error = %err, "retrying after failure");
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
