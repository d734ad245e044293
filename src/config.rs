// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into an
//! immutable [`LinkingConfig`] which is then passed to every component.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` / `PORT` | Server bind address | `0.0.0.0` / `8080` |
//! | `DATA_DIR` | Directory holding `linking.redb` | `./data` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files; HTTPS when both are set | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `{CUSTODIAN}_WALLET_LINKING_LIMIT` | Fan-in maximum per custodian | `4` |
//! | `DISABLE_{CUSTODIAN}_LINKING` | Reject new links to that custodian | `false` |
//! | `GEO_RESET_COOLDOWN_SECS` | Region-reset cooldown after a disconnect | 30 days |
//! | `UNLINK_COOLDOWN_SECS` | Minimum spacing between unlinks of one account | 30 days |
//! | `CHALLENGE_SWEEP_INTERVAL_SECS` | Challenge sweep period and max age | `300` |
//! | `BITFLYER_REQUEST_ID_TTL_SECS` | bitFlyer replay-cache retention | `86400` |
//! | `USE_CUSTODIAN_REGIONS` | Use the region document instead of the static list | `false` |
//! | `CUSTODIAN_REGIONS_URL` | Object URL of the region document | required when enabled |
//! | `REGION_REFRESH_INTERVAL_SECS` | Region document refresh period | `900` |
//! | `BLACKLISTED_COUNTRY_CODES` | Static block list, comma separated | empty |
//! | `SOLANA_BLOCKED_ADDRESS_HASHES` | Hex SHA-256 of blocked Solana addresses | empty |
//! | `ZEBPAY_LINKING_KEY` | Base64 HS256 key for ZebPay claims | unset |
//! | `BITFLYER_JWT_KEY` | HS256 key for bitFlyer claims | unset |
//! | `GEMINI_SERVER` / `GEMINI_API_KEY` | Gemini API | unset |
//! | `UPHOLD_SERVER` / `UPHOLD_ACCESS_TOKEN` | Uphold API | unset |
//! | `REPUTATION_SERVER` / `REPUTATION_TOKEN` | Reputation service | unset |
//! | `GEO_VALIDATOR_SERVER` | Geo country validator | unset |
//! | `ADMIN_API_TOKEN` | Bearer token for admin routes | unset |
//!
//! `{CUSTODIAN}` is one of `UPHOLD`, `GEMINI`, `BITFLYER`, `ZEBPAY`, `SOLANA`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use base64ct::{Base64, Encoding};

use crate::providers::ProviderKind;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Default fan-in maximum for every custodian.
pub const DEFAULT_LINKING_LIMIT: usize = 4;

const THIRTY_DAYS_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: String, value: String },

    #[error("{0} is required")]
    Missing(&'static str),
}

/// Region gate settings.
#[derive(Debug, Clone, Default)]
pub struct RegionConfig {
    pub use_custodian_regions: bool,
    pub document_url: Option<String>,
    pub refresh_interval: Duration,
    /// Uppercase ISO-3166 alpha-2 codes.
    pub blacklisted_countries: Vec<String>,
}

/// Credentials and endpoints of the collaborating services.
#[derive(Clone, Default)]
pub struct ProviderConfig {
    pub zebpay_linking_key: Option<Vec<u8>>,
    pub bitflyer_jwt_key: Option<Vec<u8>>,
    pub gemini_server: Option<String>,
    pub gemini_api_key: Option<String>,
    pub uphold_server: Option<String>,
    pub uphold_access_token: Option<String>,
    pub reputation_server: Option<String>,
    pub reputation_token: Option<String>,
    pub geo_validator_server: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("zebpay_linking_key", &self.zebpay_linking_key.as_ref().map(|_| "<redacted>"))
            .field("bitflyer_jwt_key", &self.bitflyer_jwt_key.as_ref().map(|_| "<redacted>"))
            .field("gemini_server", &self.gemini_server)
            .field("uphold_server", &self.uphold_server)
            .field("reputation_server", &self.reputation_server)
            .field("geo_validator_server", &self.geo_validator_server)
            .finish_non_exhaustive()
    }
}

/// Immutable linking configuration.
#[derive(Debug, Clone)]
pub struct LinkingConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub tls_cert_path: Option<PathBuf>,
    pub tls_key_path: Option<PathBuf>,
    pub linking_limits: HashMap<ProviderKind, usize>,
    pub disabled_custodians: HashSet<ProviderKind>,
    pub geo_reset_cooldown: chrono::Duration,
    pub unlink_cooldown: chrono::Duration,
    pub challenge_sweep_interval: Duration,
    pub bitflyer_request_id_ttl: chrono::Duration,
    pub regions: RegionConfig,
    /// Lowercase hex SHA-256 digests of blocked Solana addresses.
    pub solana_blocked_address_hashes: HashSet<String>,
    pub providers: ProviderConfig,
    pub admin_api_token: Option<String>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            tls_cert_path: None,
            tls_key_path: None,
            linking_limits: HashMap::new(),
            disabled_custodians: HashSet::new(),
            geo_reset_cooldown: chrono::Duration::seconds(THIRTY_DAYS_SECS as i64),
            unlink_cooldown: chrono::Duration::seconds(THIRTY_DAYS_SECS as i64),
            challenge_sweep_interval: Duration::from_secs(300),
            bitflyer_request_id_ttl: chrono::Duration::seconds(86_400),
            regions: RegionConfig {
                refresh_interval: Duration::from_secs(900),
                ..RegionConfig::default()
            },
            solana_blocked_address_hashes: HashSet::new(),
            providers: ProviderConfig::default(),
            admin_api_token: None,
        }
    }
}

impl LinkingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let mut linking_limits = HashMap::new();
        let mut disabled_custodians = HashSet::new();
        for kind in ProviderKind::ALL {
            let upper = kind.as_str().to_ascii_uppercase();
            let limit_var = format!("{upper}_WALLET_LINKING_LIMIT");
            if let Some(limit) = parse(&limit_var, get(&limit_var))? {
                linking_limits.insert(kind, limit);
            }
            if flag(get(&format!("DISABLE_{upper}_LINKING"))) {
                disabled_custodians.insert(kind);
            }
        }

        let use_custodian_regions = flag(get("USE_CUSTODIAN_REGIONS"));
        let document_url = get("CUSTODIAN_REGIONS_URL");
        if use_custodian_regions && document_url.is_none() {
            return Err(ConfigError::Missing("CUSTODIAN_REGIONS_URL"));
        }

        let zebpay_linking_key = match get("ZEBPAY_LINKING_KEY") {
            Some(encoded) => Some(Base64::decode_vec(&encoded).map_err(|_| ConfigError::Invalid {
                name: "ZEBPAY_LINKING_KEY".to_string(),
                value: "<redacted>".to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or(defaults.host),
            port: parse(PORT_ENV, get(PORT_ENV))?.unwrap_or(defaults.port),
            data_dir: get(DATA_DIR_ENV).map(PathBuf::from).unwrap_or(defaults.data_dir),
            tls_cert_path: get(TLS_CERT_PATH_ENV).map(PathBuf::from),
            tls_key_path: get(TLS_KEY_PATH_ENV).map(PathBuf::from),
            linking_limits,
            disabled_custodians,
            geo_reset_cooldown: seconds("GEO_RESET_COOLDOWN_SECS", get("GEO_RESET_COOLDOWN_SECS"))?
                .unwrap_or(defaults.geo_reset_cooldown),
            unlink_cooldown: seconds("UNLINK_COOLDOWN_SECS", get("UNLINK_COOLDOWN_SECS"))?
                .unwrap_or(defaults.unlink_cooldown),
            challenge_sweep_interval: interval("CHALLENGE_SWEEP_INTERVAL_SECS", get("CHALLENGE_SWEEP_INTERVAL_SECS"))?
                .unwrap_or(defaults.challenge_sweep_interval),
            bitflyer_request_id_ttl: seconds(
                "BITFLYER_REQUEST_ID_TTL_SECS",
                get("BITFLYER_REQUEST_ID_TTL_SECS"),
            )?
            .unwrap_or(defaults.bitflyer_request_id_ttl),
            regions: RegionConfig {
                use_custodian_regions,
                document_url,
                refresh_interval: interval("REGION_REFRESH_INTERVAL_SECS", get("REGION_REFRESH_INTERVAL_SECS"))?
                    .unwrap_or(defaults.regions.refresh_interval),
                blacklisted_countries: list(get("BLACKLISTED_COUNTRY_CODES"))
                    .map(|c| c.to_ascii_uppercase())
                    .collect(),
            },
            solana_blocked_address_hashes: list(get("SOLANA_BLOCKED_ADDRESS_HASHES"))
                .map(|h| h.to_ascii_lowercase())
                .collect(),
            providers: ProviderConfig {
                zebpay_linking_key,
                bitflyer_jwt_key: get("BITFLYER_JWT_KEY").map(String::into_bytes),
                gemini_server: get("GEMINI_SERVER"),
                gemini_api_key: get("GEMINI_API_KEY"),
                uphold_server: get("UPHOLD_SERVER"),
                uphold_access_token: get("UPHOLD_ACCESS_TOKEN"),
                reputation_server: get("REPUTATION_SERVER"),
                reputation_token: get("REPUTATION_TOKEN"),
                geo_validator_server: get("GEO_VALIDATOR_SERVER"),
            },
            admin_api_token: get("ADMIN_API_TOKEN"),
        })
    }

    /// Configured fan-in maximum for `custodian`, before per-account adjustments.
    pub fn linking_limit(&self, custodian: ProviderKind) -> usize {
        self.linking_limits
            .get(&custodian)
            .copied()
            .unwrap_or(DEFAULT_LINKING_LIMIT)
    }

    pub fn is_disabled(&self, custodian: ProviderKind) -> bool {
        self.disabled_custodians.contains(&custodian)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("linking.redb")
    }
}

fn parse<T: FromStr>(name: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.parse::<T>().map_err(|_| ConfigError::Invalid {
                name: name.to_string(),
                value: v.clone(),
            })
        })
        .transpose()
}

/// Non-negative whole seconds.
fn seconds(name: &str, value: Option<String>) -> Result<Option<chrono::Duration>, ConfigError> {
    let Some(secs) = parse::<i64>(name, value)? else {
        return Ok(None);
    };
    (secs >= 0)
        .then(|| chrono::Duration::try_seconds(secs))
        .flatten()
        .map(Some)
        .ok_or_else(|| ConfigError::Invalid {
            name: name.to_string(),
            value: secs.to_string(),
        })
}

/// Strictly positive whole seconds, for timer periods.
fn interval(name: &str, value: Option<String>) -> Result<Option<Duration>, ConfigError> {
    match parse::<u64>(name, value)? {
        Some(0) => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: "0".to_string(),
        }),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}

fn flag(value: Option<String>) -> bool {
    matches!(value.as_deref().map(str::to_ascii_lowercase).as_deref(), Some("true" | "1" | "yes"))
}

fn list(value: Option<String>) -> impl Iterator<Item = String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .into_iter()
}
