use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::Backend;

mod admin;
mod http;

pub use http::{ApiError, ADMIN_HEADER};

const REQUEST_ID_HEADER: &str = "x-request-id";

pub struct Api {
    backend: Arc<Backend>,
}

impl Api {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    pub fn router(&self) -> Router {
        let config = &self.backend.config;
        let allow_any_origin = config.allowed_origins.iter().any(|origin| origin == "*");
        let origins = config
            .allowed_origins
            .iter()
            .filter(|origin| *origin != "*")
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Invalid allowed origin: {}", origin);
                    None
                }
            })
            .collect::<Vec<_>>();

        // Configure CORS
        let cors = if allow_any_origin {
            CorsLayer::new().allow_origin(AllowOrigin::any())
        } else {
            CorsLayer::new().allow_origin(AllowOrigin::list(origins))
        }
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header::HeaderName::from_static(ADMIN_HEADER),
        ])
        .expose_headers([header::HeaderName::from_static(REQUEST_ID_HEADER)]);

        let admin = Router::new()
            .route("/transactions", get(admin::transactions))
            .route("/transactions/:id", delete(admin::purge_transaction))
            .route("/transactions/:id/status", post(admin::set_status))
            .route("/accounts", get(admin::accounts))
            .route("/accounts/:id/adjust", post(admin::adjust_balance))
            .route("/accounts/:id/block", post(admin::set_blocked))
            .route(
                "/payment-methods",
                get(admin::payment_methods).post(admin::add_payment_method),
            )
            .route(
                "/payment-methods/:id",
                delete(admin::delete_payment_method).patch(admin::edit_payment_method),
            )
            .route(
                "/payment-methods/:id/toggle",
                post(admin::toggle_payment_method),
            )
            .route("/stats", get(admin::stats))
            .route("/snapshot", post(admin::snapshot));

        let router = Router::new()
            .route("/healthz", get(http::healthz))
            .route("/config", get(http::config))
            .route("/curve/:rows/:risk", get(http::curve))
            .route("/accounts/:id", get(http::account))
            .route("/accounts/:id/play", post(http::play))
            .route("/accounts/:id/reset-demo", post(http::reset_demo))
            .route(
                "/accounts/:id/transactions",
                get(http::transactions).post(http::submit_transaction),
            )
            .route("/accounts/:id/history", get(http::history))
            .route("/payment-methods", get(http::payment_methods))
            .nest("/admin", admin);

        let router = router.layer(cors);
        let router = match config.http_body_limit_bytes {
            Some(limit) if limit > 0 => router.layer(DefaultBodyLimit::max(limit)),
            _ => router,
        };
        let router = router.layer(middleware::from_fn(request_id_middleware));
        let router = router.layer(TraceLayer::new_for_http());

        router.with_state(self.backend.clone())
    }
}

async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(header::HeaderName::from_static(REQUEST_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();
    let mut response = next.run(req).await;
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(
            header::HeaderName::from_static(REQUEST_ID_HEADER),
            header_value,
        );
    }
    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "http.request"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServerConfig;
    use axum::{
        body::{to_bytes, Body},
        http::{Request as HttpRequest, StatusCode},
    };
    use plinko_execution::Memory;
    use plinko_types::AccountId;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const ROOT: &str = "root";

    async fn app() -> Router {
        let config = ServerConfig {
            admins: vec![AccountId::new(ROOT).unwrap()],
            seed: Some(9),
            payment_methods: vec![("bkash".into(), "01965551368".into())],
            ..ServerConfig::default()
        };
        let backend = Arc::new(Backend::new(config, Memory::new()));
        backend.seed_payment_methods().await.unwrap();
        Api::new(backend).router()
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        admin: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(admin) = admin {
            builder = builder.header(ADMIN_HEADER, admin);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
        send(app, Method::GET, uri, None, None).await
    }

    async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        send(app, Method::POST, uri, None, Some(body)).await
    }

    fn deposit(amount: &str) -> Value {
        json!({
            "kind": "deposit",
            "amount": amount,
            "method": "bkash",
            "counterpartyPhone": "01712345678",
            "externalRef": "TRX9A8B7C",
        })
    }

    #[tokio::test]
    async fn serves_symmetric_curves() {
        let app = app().await;
        let (status, curve) = get(&app, "/curve/8/high").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(curve["rows"], 8);
        assert_eq!(curve["risk"], "high");
        let multipliers = curve["multipliers"].as_array().unwrap();
        assert_eq!(multipliers.len(), 9);
        for i in 0..9 {
            assert_eq!(multipliers[i], multipliers[8 - i]);
        }
        assert!(multipliers[4].as_f64().unwrap() < 1.0);

        let (status, body) = get(&app, "/curve/20/low").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        let (status, _) = get(&app, "/curve/8/extreme").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn play_moves_the_demo_balance() {
        let app = app().await;
        let (status, play) = post(
            &app,
            "/accounts/alice/play",
            json!({ "stake": "10", "board": { "rows": 12, "risk": "low" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(play["bet"]["balanceAfter"], "990.00");
        assert!(play["bucket"].as_u64().unwrap() <= 12);

        let (_, account) = get(&app, "/accounts/alice").await;
        assert_eq!(account["demoBalance"], play["balance"]);
        assert_eq!(account["realBalance"], "0.00");
        let (_, history) = get(&app, "/accounts/alice/history").await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["payout"], play["payout"]);
    }

    #[tokio::test]
    async fn unfunded_play_changes_nothing() {
        let app = app().await;
        let (status, body) = post(
            &app,
            "/accounts/bob/play",
            json!({ "stake": "1000.01", "mode": "demo" }),
        )
        .await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"], "insufficient_funds");
        assert_eq!(body["retryable"], false);

        let (_, account) = get(&app, "/accounts/bob").await;
        assert_eq!(account["demoBalance"], "1000.00");
        let (_, history) = get(&app, "/accounts/bob/history").await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deposit_review_round_trip() {
        let app = app().await;
        let (status, tx) = post(&app, "/accounts/carol/transactions", deposit("500")).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tx["status"], "pending");
        let uri = format!("/admin/transactions/{}/status", tx["id"]);

        let (status, change) = send(
            &app,
            Method::POST,
            &uri,
            Some(ROOT),
            Some(json!({ "status": "approved" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(change["previous"], "pending");
        assert_eq!(change["delta"], "500.00");
        assert_eq!(change["balance"], "500.00");

        let (_, change) = send(
            &app,
            Method::POST,
            &uri,
            Some(ROOT),
            Some(json!({ "status": "rejected" })),
        )
        .await;
        assert_eq!(change["delta"], "-500.00");
        assert_eq!(change["balance"], "0.00");

        let (_, own) = get(&app, "/accounts/carol/transactions").await;
        assert_eq!(own[0]["status"], "rejected");
    }

    #[tokio::test]
    async fn rejects_malformed_wallet_requests() {
        let app = app().await;
        let mut request = deposit("500");
        request["counterpartyPhone"] = json!("12345");
        let (status, _) = post(&app, "/accounts/dave/transactions", request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(&app, "/accounts/dave/transactions", deposit("99.99")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let withdraw = json!({
            "kind": "withdraw",
            "amount": "200",
            "method": "bkash",
            "counterpartyPhone": "01712345678",
        });
        let (status, _) = post(&app, "/accounts/dave/transactions", withdraw).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);

        let (_, own) = get(&app, "/accounts/dave/transactions").await;
        assert!(own.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn admin_routes_need_an_administrator() {
        let app = app().await;
        let (status, body) = get(&app, "/admin/stats").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthenticated");

        let (status, body) = send(&app, Method::GET, "/admin/stats", Some("mallory"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "permission");

        get(&app, "/accounts/erin").await;
        let (status, stats) = send(&app, Method::GET, "/admin/stats", Some(ROOT), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stats["accounts"], 1);
        assert_eq!(stats["pending"], 0);
    }

    #[tokio::test]
    async fn adjustments_and_blocks() {
        let app = app().await;
        get(&app, "/accounts/frank").await;
        let (status, tx) = send(
            &app,
            Method::POST,
            "/admin/accounts/frank/adjust",
            Some(ROOT),
            Some(json!({ "amount": "50", "direction": "credit" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(tx["method"], "admin");
        assert_eq!(tx["status"], "approved");
        assert_eq!(tx["note"], "Admin Bonus");
        let (_, account) = get(&app, "/accounts/frank").await;
        assert_eq!(account["realBalance"], "50.00");

        let (status, _) = send(
            &app,
            Method::POST,
            "/admin/accounts/nobody/adjust",
            Some(ROOT),
            Some(json!({ "amount": "50", "direction": "credit" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, account) = send(
            &app,
            Method::POST,
            "/admin/accounts/frank/block",
            Some(ROOT),
            Some(json!({ "blocked": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(account["blocked"], true);
        let (status, _) = post(
            &app,
            "/accounts/frank/play",
            json!({ "stake": "10", "mode": "real" }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listed) = send(
            &app,
            Method::GET,
            "/admin/transactions?accountId=frank&sort=amount&order=asc",
            Some(ROOT),
            None,
        )
        .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manages_payment_methods() {
        let app = app().await;
        let (status, method) = send(
            &app,
            Method::POST,
            "/admin/payment-methods",
            Some(ROOT),
            Some(json!({ "name": "upay", "number": "01500000000" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(method["enabled"], true);
        let uri = format!("/admin/payment-methods/{}", method["id"]);

        let (_, public) = get(&app, "/payment-methods").await;
        assert_eq!(public.as_array().unwrap().len(), 2);

        let (status, method) = send(
            &app,
            Method::PATCH,
            &uri,
            Some(ROOT),
            Some(json!({ "enabled": false, "number": "01500000009" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(method["enabled"], false);
        assert_eq!(method["number"], "01500000009");
        let (_, public) = get(&app, "/payment-methods").await;
        assert_eq!(public.as_array().unwrap().len(), 1);

        let (status, _) = send(&app, Method::PATCH, &uri, Some(ROOT), Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, method) = send(
            &app,
            Method::POST,
            &format!("{uri}/toggle"),
            Some(ROOT),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(method["enabled"], true);

        let (status, _) = send(&app, Method::DELETE, &uri, Some(ROOT), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, all) = send(&app, Method::GET, "/admin/payment-methods", Some(ROOT), None).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
        let (status, _) = send(&app, Method::DELETE, &uri, Some(ROOT), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn purge_and_snapshot() {
        let app = app().await;
        let (_, tx) = post(&app, "/accounts/gina/transactions", deposit("150")).await;
        let uri = format!("/admin/transactions/{}", tx["id"]);
        let (status, purged) = send(&app, Method::DELETE, &uri, Some(ROOT), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(purged["id"], tx["id"]);
        let (_, own) = get(&app, "/accounts/gina/transactions").await;
        assert!(own.as_array().unwrap().is_empty());

        let (status, body) = send(&app, Method::POST, "/admin/snapshot", Some(ROOT), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_configured");
    }

    #[tokio::test]
    async fn echoes_request_ids() {
        let app = app().await;
        let request = HttpRequest::builder()
            .uri("/healthz")
            .header(REQUEST_ID_HEADER, "abc-123")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "abc-123");
    }

    #[tokio::test]
    async fn generated_request_ids_are_uuids() {
        let mut seen = Vec::new();
        for _ in 0..2 {
            // A fresh router each time, as after a restart.
            let request = HttpRequest::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap();
            let response = app().await.oneshot(request).await.unwrap();
            let id = response.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
            assert!(Uuid::parse_str(&id).is_ok(), "not a uuid: {id}");
            seen.push(id);
        }
        assert_ne!(seen[0], seen[1]);
    }
}
