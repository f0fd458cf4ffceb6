use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rihla_api::middleware::Claims;
use rihla_api::{app, AppState, Backends};
use rihla_booking::NotificationDispatcher;
use rihla_core::{InventoryItem, Principal, Role, StaticRoleDirectory};
use rihla_store::{AuthConfig, BusinessRules};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "test-secret";
const WEBHOOK_SECRET: &str = "test-hook";

struct TestApp {
    router: Router,
    state: AppState,
    provider_id: Uuid,
    hotel_id: Uuid,
}

impl TestApp {
    async fn new() -> Self {
        Self::with_webhook_secret(WEBHOOK_SECRET).await
    }

    async fn with_webhook_secret(webhook_secret: &str) -> Self {
        let provider_id = Uuid::new_v4();

        let roles = StaticRoleDirectory::new();
        roles.grant("pilgrim-1", Role::Customer, None);
        roles.grant("pilgrim-2", Role::Customer, None);
        roles.grant("agent-1", Role::Provider, Some(provider_id));
        roles.grant("agent-2", Role::Provider, Some(Uuid::new_v4()));
        roles.grant("ops", Role::Admin, None);

        let auth = AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            webhook_secret: webhook_secret.to_string(),
            static_roles: Vec::new(),
        };
        let state = AppState::new(
            Backends::in_memory(Arc::new(roles)),
            &auth,
            &BusinessRules::default(),
            NotificationDispatcher::new(64),
        )
        .unwrap();

        let hotel_id = Uuid::new_v4();
        let hotel: InventoryItem = serde_json::from_value(json!({
            "type": "hotel",
            "id": hotel_id,
            "provider_id": provider_id,
            "name": "Dar Al Eiman",
            "unit_price": 32000,
            "rooms": 5,
            "city": "Makkah",
            "room_tiers": [{ "code": "haram-view", "surcharge": 8000 }]
        }))
        .unwrap();
        state
            .catalog
            .upsert_item(&Principal::admin("ops"), hotel)
            .await
            .unwrap();

        Self {
            router: app(state.clone()),
            state,
            provider_id,
            hotel_id,
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token(user)));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn book_hotel(&self, user: &str, start: &str, end: &str, quantity: u32) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            "/v1/bookings",
            Some(user),
            Some(json!({
                "item_type": "hotel",
                "item_id": self.hotel_id,
                "date_range": { "start": start, "end": end },
                "quantity": quantity
            })),
        )
        .await
    }

    async fn pay(&self, booking_id: &str, amount: i64, secret: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/v1/webhooks/payments")
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Webhook-Secret", secret)
            .body(Body::from(
                json!({
                    "intent_id": "pi_123",
                    "booking_id": booking_id,
                    "amount": amount,
                    "status": "SUCCEEDED"
                })
                .to_string(),
            ))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

fn token(sub: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(JWT_SECRET.as_bytes())).unwrap()
}

#[tokio::test]
async fn test_create_and_read_booking() {
    let app = TestApp::new().await;

    let (status, body) = app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-15", 3).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["total_price"], 32000 * 5);

    let id = body["booking_id"].as_str().unwrap().to_string();
    let uri = format!("/v1/bookings/{}", id);

    let (status, booking) = app.send(Method::GET, &uri, Some("pilgrim-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["quantity"], 3);
    assert_eq!(booking["payment_status"], "unpaid");

    let (status, _) = app.send(Method::GET, &uri, Some("agent-1"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.send(Method::GET, &uri, Some("pilgrim-2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AUTHORIZATION_ERROR");

    let missing = format!("/v1/bookings/{}", Uuid::new_v4());
    let (status, body) = app.send(Method::GET, &missing, Some("ops"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");
}

#[tokio::test]
async fn test_overlapping_stay_conflicts() {
    let app = TestApp::new().await;

    let (status, _) = app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-15", 3).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.book_hotel("pilgrim-2", "2025-12-12", "2025-12-14", 3).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "AVAILABILITY_CONFLICT");
    assert!(
        body["message"].as_str().unwrap().contains("only 2 unit(s) remain"),
        "{body}"
    );

    // Check-out day is free again
    let (status, _) = app.book_hotel("pilgrim-2", "2025-12-15", "2025-12-17", 3).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_callers_without_rights() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/bookings",
            None,
            Some(json!({
                "item_type": "hotel",
                "item_id": app.hotel_id,
                "date_range": { "start": "2025-12-10", "end": "2025-12-12" }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "{body}");

    // Valid signature but unknown user: guest
    let (status, _) = app.book_hotel("stranger", "2025-12-10", "2025-12-12", 1).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method(Method::GET)
        .uri("/v1/dashboard")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_invalid_requests() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/bookings",
            Some("pilgrim-1"),
            Some(json!({ "item_type": "hotel", "item_id": app.hotel_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = app
        .send(
            Method::POST,
            "/v1/bookings",
            Some("pilgrim-1"),
            Some(json!({ "item_type": "castle", "item_id": app.hotel_id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, _) = app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-12", 0).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Stays beyond the configured limit never reach the ledger
    let (status, body) = app.book_hotel("pilgrim-1", "2025-01-01", "4025-01-01", 1).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "VALIDATION_ERROR");

    let (status, body) = app
        .book_hotel("pilgrim-1", "+262142-12-31", "+262142-12-31", 1)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"], "VALIDATION_ERROR");

    // Flat dates are not the request shape
    let (status, _) = app
        .send(
            Method::POST,
            "/v1/bookings",
            Some("pilgrim-1"),
            Some(json!({
                "item_type": "hotel",
                "item_id": app.hotel_id,
                "start_date": "2025-12-10",
                "end_date": "2025-12-12"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_webhook_secret_accepts_nothing() {
    let app = TestApp::with_webhook_secret("").await;

    let (_, body) = app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-12", 1).await;
    let id = body["booking_id"].as_str().unwrap().to_string();

    let (status, body) = app.pay(&id, 64000, "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AUTHENTICATION_ERROR");

    let (_, booking) = app
        .send(Method::GET, &format!("/v1/bookings/{}", id), Some("ops"), None)
        .await;
    assert_eq!(booking["payment_status"], "unpaid");
}

#[tokio::test]
async fn test_payment_webhook_and_cancellation() {
    let app = TestApp::new().await;

    let (_, body) = app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-12", 1).await;
    let id = body["booking_id"].as_str().unwrap().to_string();

    let (status, body) = app.pay(&id, 64000, "wrong").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "AUTHENTICATION_ERROR");

    let (status, body) = app.pay(&id, 1, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, body) = app.pay(&id, 64000, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "confirmed");
    assert_eq!(body["payment_status"], "paid");

    // Redelivery is harmless
    let (status, _) = app.pay(&id, 64000, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::OK);

    let (status, stats) = app
        .send(
            Method::GET,
            &format!("/v1/providers/{}/dashboard", app.provider_id),
            Some("agent-1"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_bookings"], 1);
    assert_eq!(stats["total_revenue"], 64000);
    assert_eq!(stats["active_listings"], 1);

    let cancel = format!("/v1/bookings/{}/cancel", id);
    let (status, body) = app.send(Method::POST, &cancel, Some("pilgrim-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ack"], true);

    let (status, body) = app.send(Method::POST, &cancel, Some("pilgrim-1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_TERMINAL");

    let (_, booking) = app
        .send(Method::GET, &format!("/v1/bookings/{}", id), Some("ops"), None)
        .await;
    assert_eq!(booking["status"], "cancelled");
    assert_eq!(booking["payment_status"], "refunded");

    let (status, body) = app.pay(&id, 64000, WEBHOOK_SECRET).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ALREADY_TERMINAL");
}

#[tokio::test]
async fn test_dashboard_scopes() {
    let app = TestApp::new().await;
    app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-12", 1).await;

    let provider_uri = format!("/v1/providers/{}/dashboard", app.provider_id);

    let (status, _) = app.send(Method::GET, &provider_uri, Some("agent-2"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, &provider_uri, Some("pilgrim-1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, snapshot) = app.send(Method::GET, "/v1/dashboard", Some("agent-1"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["scope"], "provider");
    assert_eq!(snapshot["pending_bookings"], 1);
    assert_eq!(snapshot["monthly_buckets"].as_array().unwrap().len(), 6);

    let (status, snapshot) = app.send(Method::GET, "/v1/dashboard", Some("ops"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["scope"], "all");
    assert_eq!(snapshot["total_bookings"], 1);

    let (status, _) = app.send(Method::GET, "/v1/dashboard", Some("pilgrim-1"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_inventory_writes_are_gated() {
    let app = TestApp::new().await;

    let transport = |provider_id: Uuid| {
        json!({
            "type": "transport",
            "id": Uuid::new_v4(),
            "provider_id": provider_id,
            "name": "Jeddah - Makkah coach",
            "unit_price": 4500,
            "seats": 40,
            "route": "JED-MKK",
            "departure": "2025-12-10T08:00:00Z"
        })
    };

    let (status, body) = app
        .send(Method::PUT, "/v1/inventory", Some("pilgrim-1"), Some(transport(app.provider_id)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "AUTHORIZATION_ERROR");

    let (status, _) = app
        .send(Method::PUT, "/v1/inventory", Some("agent-2"), Some(transport(app.provider_id)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let item = transport(app.provider_id);
    let (status, body) = app
        .send(Method::PUT, "/v1/inventory", Some("agent-1"), Some(item.clone()))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let item_uri = format!("/v1/inventory/transport/{}", item["id"].as_str().unwrap());
    let (status, body) = app.send(Method::GET, &item_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["seats"], 40);

    let (status, body) = app
        .send(
            Method::PUT,
            &format!("{}/active", item_uri),
            Some("agent-1"),
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], false);

    let (status, _) = app
        .send(
            Method::POST,
            "/v1/bookings",
            Some("pilgrim-1"),
            Some(json!({ "item_type": "transport", "item_id": item["id"], "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_event_stream_is_provider_scoped() {
    let app = TestApp::new().await;

    let open = |user: &'static str| {
        Request::builder()
            .method(Method::GET)
            .uri(format!("/v1/providers/{}/events", app.provider_id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token(user)))
            .body(Body::empty())
            .unwrap()
    };

    let response = app.router.clone().oneshot(open("agent-1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let response = app.router.clone().oneshot(open("agent-2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let app = TestApp::new().await;

    app.book_hotel("pilgrim-1", "2025-12-10", "2025-12-12", 5).await;
    app.book_hotel("pilgrim-2", "2025-12-11", "2025-12-12", 1).await;

    let request = Request::builder()
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(r#"rihla_bookings_total{outcome="created"} 1"#), "{text}");
    assert!(text.contains(r#"rihla_bookings_total{outcome="conflict"} 1"#), "{text}");
    assert_eq!(
        app.state.metrics.bookings(rihla_api::metrics::BookingOutcome::Created),
        1
    );
}
