// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    linking::LinkingInfo,
    models::{
        AllowListResponse, BitflyerClaimRequest, ChallengeResponse, CreateChallengeRequest,
        DisconnectResponse, GeminiClaimRequest, LinkResponse, LinkingLimitResponse,
        RegisterWalletRequest, SolanaConnectRequest, UpholdClaimRequest, WalletResponse,
        ZebpayClaimRequest,
    },
    providers::ProviderKind,
    state::AppState,
};

pub mod admin;
pub mod health;
pub mod linking;

pub fn router(state: AppState) -> Router {
    let v3_routes = Router::new()
        .route("/wallet/challenges", post(linking::create_challenge))
        .route("/wallet/zebpay/{wallet_id}/claim", post(linking::claim_zebpay))
        .route("/wallet/gemini/{wallet_id}/claim", post(linking::claim_gemini))
        .route("/wallet/bitflyer/{wallet_id}/claim", post(linking::claim_bitflyer))
        .route("/wallet/uphold/{wallet_id}/claim", post(linking::claim_uphold))
        .route("/wallet/solana/{wallet_id}/connect", post(linking::connect_solana))
        .route("/wallet/{wallet_id}/claim", delete(linking::disconnect))
        .route(
            "/wallet/{wallet_id}/linking-info/{custodian}",
            get(linking::linking_info),
        )
        .route("/admin/wallets", post(admin::register_wallet))
        .route("/admin/allow-list/{wallet_id}", post(admin::allow_list))
        .route(
            "/admin/linking-limit/{linking_id}/increase",
            post(admin::increase_linking_limit),
        )
        .route(
            "/admin/wallet/{wallet_id}/unlink/{custodian}",
            post(admin::unlink),
        )
        .with_state(state.clone());

    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .nest("/v3", v3_routes)
        .merge(health_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        linking::create_challenge,
        linking::claim_zebpay,
        linking::claim_gemini,
        linking::claim_bitflyer,
        linking::claim_uphold,
        linking::connect_solana,
        linking::disconnect,
        linking::linking_info,
        admin::register_wallet,
        admin::allow_list,
        admin::increase_linking_limit,
        admin::unlink
    ),
    components(
        schemas(
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            CreateChallengeRequest,
            ChallengeResponse,
            ZebpayClaimRequest,
            GeminiClaimRequest,
            BitflyerClaimRequest,
            UpholdClaimRequest,
            SolanaConnectRequest,
            LinkResponse,
            DisconnectResponse,
            LinkingInfo,
            ProviderKind,
            RegisterWalletRequest,
            WalletResponse,
            AllowListResponse,
            LinkingLimitResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Linking", description = "Custodian account linking"),
        (name = "Admin", description = "Operator tooling")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        response::Response,
    };
    use chrono::Utc;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::{LinkingConfig, ProviderConfig};
    use crate::linking::test_support::{open_db, FakeReputation};
    use crate::linking::{ChallengeService, Collaborators, ComplianceGate, LinkingService};

    const ADMIN_TOKEN: &str = "operator-secret";
    const ZEBPAY_KEY: &[u8] = b"zebpay";
    const WALLET_KEY: &str = "0a0b0c0d0e0f101112131415161718191a1b1c1d1e1f20212223242526272829";

    struct TestApp {
        _dir: tempfile::TempDir,
        router: Router,
    }

    fn app_with(admin_api_token: Option<&str>) -> TestApp {
        let (dir, db) = open_db();
        let config = Arc::new(LinkingConfig {
            data_dir: dir.path().to_path_buf(),
            admin_api_token: admin_api_token.map(str::to_string),
            providers: ProviderConfig {
                zebpay_linking_key: Some(ZEBPAY_KEY.to_vec()),
                ..ProviderConfig::default()
            },
            ..LinkingConfig::default()
        });
        let gate = Arc::new(ComplianceGate::new(&config.regions));
        let service = Arc::new(LinkingService::new(
            db.clone(),
            config.clone(),
            gate.clone(),
            Arc::new(ChallengeService::new(db)),
            Collaborators {
                reputation: FakeReputation::new(),
                geo: None,
                gemini: None,
                uphold: None,
            },
        ));
        TestApp {
            _dir: dir,
            router: router(AppState::new(service, gate, config)),
        }
    }

    fn app() -> TestApp {
        app_with(Some(ADMIN_TOKEN))
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        app.router.clone().oneshot(request).await.unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, wallet: Option<Uuid>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(wallet) = wallet {
            builder = builder.header("x-wallet-id", wallet.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn admin(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn wallet_get(method: &str, uri: &str, wallet: Uuid) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("x-wallet-id", wallet.to_string())
            .body(Body::empty())
            .unwrap()
    }

    async fn register(app: &TestApp) -> Uuid {
        let wallet = Uuid::new_v4();
        let response = send(
            app,
            admin(
                "POST",
                "/v3/admin/wallets",
                json!({ "paymentId": wallet, "publicKey": WALLET_KEY, "altcurrency": "BAT" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        wallet
    }

    fn zebpay_token(account_id: &str) -> String {
        let now = Utc::now().timestamp();
        let claims = json!({
            "iat": now,
            "exp": now + 300,
            "depositId": "zp-deposit",
            "accountId": account_id,
            "isValid": true,
            "countryCode": "IN",
        });
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(ZEBPAY_KEY)).unwrap()
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let app = app();
        let _ = app.router.into_make_service();
    }

    #[tokio::test]
    async fn liveness_and_readiness() {
        let app = app();
        let live = send(&app, Request::get("/health/live").body(Body::empty()).unwrap()).await;
        assert_eq!(live.status(), StatusCode::OK);

        let ready = send(&app, Request::get("/health/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(ready.status(), StatusCode::OK);
        let body = json_body(ready).await;
        assert_eq!(body["checks"]["data_dir"], "ok");
        assert!(body["checks"].get("regions").is_none());
    }

    #[tokio::test]
    async fn admin_routes_require_configured_token() {
        let disabled = app_with(None);
        let response = send(&disabled, admin("POST", "/v3/admin/wallets", json!({}))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_code"], "admin_disabled");

        let app = app();
        let request = Request::post(format!("/v3/admin/linking-limit/{}/increase", Uuid::new_v4()))
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(&app, request).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn challenge_must_be_requested_by_its_wallet() {
        let app = app();
        let wallet = register(&app).await;

        let response = send(
            &app,
            post_json("/v3/wallet/challenges", Some(Uuid::new_v4()), json!({ "paymentId": wallet })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error_code"], "wallet_mismatch");

        let response = send(
            &app,
            post_json("/v3/wallet/challenges", Some(wallet), json!({ "paymentId": wallet })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["challengeId"].as_str().unwrap().len(), 64);
    }

    #[tokio::test]
    async fn claim_requires_matching_wallet_header() {
        let app = app();
        let wallet = register(&app).await;
        let uri = format!("/v3/wallet/zebpay/{wallet}/claim");
        let body = json!({ "linkingInfo": zebpay_token("zp-1") });

        let missing = send(&app, post_json(&uri, None, body.clone())).await;
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let other = send(&app, post_json(&uri, Some(Uuid::new_v4()), body)).await;
        assert_eq!(other.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(other).await["error_code"], "wallet_mismatch");
    }

    #[tokio::test]
    async fn zebpay_claim_info_and_disconnect() {
        let app = app();
        let wallet = register(&app).await;

        let response = send(
            &app,
            post_json(
                &format!("/v3/wallet/zebpay/{wallet}/claim"),
                Some(wallet),
                json!({ "linkingInfo": zebpay_token("zp-1") }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "geoCountry": "IN" }));

        let info = send(
            &app,
            wallet_get("GET", &format!("/v3/wallet/{wallet}/linking-info/zebpay"), wallet),
        )
        .await;
        assert_eq!(info.status(), StatusCode::OK);
        let info = json_body(info).await;
        assert_eq!(info["walletsLinked"], 1);
        assert_eq!(info["openLinkingSlots"], 3);

        let response = send(&app, wallet_get("DELETE", &format!("/v3/wallet/{wallet}/claim"), wallet)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["disconnected"], 1);

        let info = send(
            &app,
            wallet_get("GET", &format!("/v3/wallet/{wallet}/linking-info/zebpay"), wallet),
        )
        .await;
        assert_eq!(info.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_proof_is_a_bad_request() {
        let app = app();
        let wallet = register(&app).await;
        let response = send(
            &app,
            post_json(
                &format!("/v3/wallet/zebpay/{wallet}/claim"),
                Some(wallet),
                json!({ "linkingInfo": "not-a-jwt" }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error_code"], "invalid_token");
    }

    #[tokio::test]
    async fn unknown_custodian_is_rejected() {
        let app = app();
        let wallet = register(&app).await;
        let response = send(
            &app,
            wallet_get("GET", &format!("/v3/wallet/{wallet}/linking-info/paypal"), wallet),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error_code"], "unknown_custodian");
    }

    #[tokio::test]
    async fn admin_unlink_and_limit() {
        let app = app();
        let wallet = register(&app).await;
        send(
            &app,
            post_json(
                &format!("/v3/wallet/zebpay/{wallet}/claim"),
                Some(wallet),
                json!({ "linkingInfo": zebpay_token("zp-2") }),
            ),
        )
        .await;

        let linking_id = crate::providers::linking_id_for("zp-2");
        let response = send(
            &app,
            admin("POST", &format!("/v3/admin/linking-limit/{linking_id}/increase"), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["extraSlots"], 1);

        let uri = format!("/v3/admin/wallet/{wallet}/unlink/zebpay");
        let response = send(&app, admin("POST", &uri, json!({}))).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&app, admin("POST", &uri, json!({}))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["error_code"], "no_active_link");
    }

    #[tokio::test]
    async fn allow_list_unknown_wallet_is_not_found() {
        let app = app();
        let response = send(
            &app,
            admin("POST", &format!("/v3/admin/allow-list/{}", Uuid::new_v4()), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let wallet = register(&app).await;
        let response = send(&app, admin("POST", &format!("/v3/admin/allow-list/{wallet}"), json!({}))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["paymentId"], wallet.to_string());
    }
}
