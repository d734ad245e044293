// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use custodian_link_server::{
    api::router,
    clients::{
        GeminiApi, GeoCountryValidator, HttpGeminiApi, HttpGeoCountryValidator, HttpRegionSource,
        HttpReputationClient, HttpUpholdApi, UpholdApi,
    },
    config::{ConfigError, LinkingConfig, LOG_FORMAT_ENV},
    linking::{ChallengeService, ChallengeSweeper, Collaborators, ComplianceGate, LinkingService, RegionRefresher},
    state::AppState,
    storage::LinkDatabase,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Seconds in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE_SECS: u64 = 10;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }
}

fn build_collaborators(config: &LinkingConfig) -> Result<Collaborators, BoxError> {
    let providers = &config.providers;

    let reputation_server = providers
        .reputation_server
        .as_deref()
        .ok_or(ConfigError::Missing("REPUTATION_SERVER"))?;
    let reputation = Arc::new(HttpReputationClient::new(
        reputation_server,
        providers.reputation_token.clone(),
    )?);

    // Custodian clients are optional; their verifiers report misconfiguration.
    let geo = match providers.geo_validator_server.as_deref() {
        Some(server) => Some(Arc::new(HttpGeoCountryValidator::new(server)?) as Arc<dyn GeoCountryValidator>),
        None => {
            warn!("GEO_VALIDATOR_SERVER not set, Solana linking will be rejected");
            None
        }
    };
    let gemini = match providers.gemini_server.as_deref() {
        Some(server) => Some(
            Arc::new(HttpGeminiApi::new(server, providers.gemini_api_key.clone())?) as Arc<dyn GeminiApi>,
        ),
        None => {
            warn!("GEMINI_SERVER not set, Gemini linking will be rejected");
            None
        }
    };
    let uphold = match providers.uphold_server.as_deref() {
        Some(server) => Some(
            Arc::new(HttpUpholdApi::new(server, providers.uphold_access_token.clone())?) as Arc<dyn UpholdApi>,
        ),
        None => {
            warn!("UPHOLD_SERVER not set, Uphold linking will be rejected");
            None
        }
    };

    Ok(Collaborators {
        reputation,
        geo,
        gemini,
        uphold,
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_tracing();

    let config = Arc::new(LinkingConfig::from_env()?);
    info!(data_dir = %config.data_dir.display(), "starting custodian link server");

    let db = Arc::new(LinkDatabase::open(&config.database_path())?);
    let gate = Arc::new(ComplianceGate::new(&config.regions));
    let challenges = Arc::new(ChallengeService::new(db.clone()));
    let collaborators = build_collaborators(&config)?;

    let shutdown = CancellationToken::new();

    if config.regions.use_custodian_regions {
        if let Some(url) = config.regions.document_url.as_deref() {
            let refresher = RegionRefresher::new(
                gate.clone(),
                Arc::new(HttpRegionSource::new(url)?),
                config.regions.refresh_interval,
            );
            tokio::spawn(refresher.run(shutdown.clone()));
        }
    }

    let sweeper = ChallengeSweeper::new(
        challenges.clone(),
        db.clone(),
        config.challenge_sweep_interval,
        config.bitflyer_request_id_ttl,
    );
    tokio::spawn(sweeper.run(shutdown.clone()));

    let service = Arc::new(LinkingService::new(
        db,
        config.clone(),
        gate.clone(),
        challenges,
        collaborators,
    ));
    let app = router(AppState::new(service, gate, config.clone()));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match (&config.tls_cert_path, &config.tls_key_path) {
        (Some(cert), Some(key)) => {
            rustls::crypto::ring::default_provider()
                .install_default()
                .map_err(|_| "failed to install rustls crypto provider")?;
            let tls_config = RustlsConfig::from_pem_file(cert, key).await?;

            let handle: Handle<SocketAddr> = Handle::new();
            let on_shutdown = handle.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                token.cancelled().await;
                on_shutdown.graceful_shutdown(Some(Duration::from_secs(SHUTDOWN_GRACE_SECS)));
            });

            info!(%addr, "listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
        _ => {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "listening on http (docs at /docs)");
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .await?;
        }
    }

    shutdown.cancel();
    info!("server stopped");
    Ok(())
}
