// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{middleware, Router};
use offseason_conversion::testing::{FakeCreditService, FakeGateway};
use offseason_conversion::{
    AcuityConfig, CertificateLookup, ConversionError, ConversionService, EngineConfig,
    RetryPolicy, StripeConfig, TierTable, WinterProductTable,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::create_router;
use crate::security::security_headers_middleware;
use crate::state::AppState;

fn engine_config() -> EngineConfig {
    EngineConfig {
        acuity: AcuityConfig {
            base_url: "http://acuity.invalid".to_string(),
            user_id: "user".to_string(),
            api_key: "key".to_string(),
            offseason_appointment_type_id: "32116738".to_string(),
            winter_appointment_type_id: "25250022".to_string(),
            timeout: Duration::from_secs(5),
        },
        stripe: StripeConfig {
            secret_key: "sk_test_unused".to_string(),
            app_base_url: "https://upgrade.example.com".to_string(),
            timeout: Duration::from_secs(5),
        },
        tiers: TierTable::standard(),
        winter_products: WinterProductTable::new([(3, 1800003), (5, 1800005)]).unwrap(),
        read_retry: RetryPolicy::none(),
        require_paid_upgrade: true,
    }
}

fn lookup() -> CertificateLookup {
    CertificateLookup {
        product_id: 1742301,
        remaining_counts: HashMap::from([("32116738".to_string(), 5), ("777".to_string(), 0)]),
        external_id: "4471".to_string(),
    }
}

fn app(credits: FakeCreditService, gateway: FakeGateway) -> Router {
    let service = ConversionService::new(engine_config(), Arc::new(credits), Arc::new(gateway));
    create_router(AppState::new(service))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json")
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn adjustment_body() -> Value {
    json!({
        "conversionType": "adjustment",
        "certificateCode": "ABCD1234",
        "certificateId": "4471",
        "email": "skier@example.com",
        "currentBalance": 5,
        "adjustedBalance": 3,
        "otherRemainingBalance": 0
    })
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let (status, body) = send(app(FakeCreditService::default(), FakeGateway::default()), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

// =============================================================================
// Certificate check
// =============================================================================

#[tokio::test]
async fn test_check_missing_certificate() {
    let app = app(FakeCreditService::default(), FakeGateway::default());
    let (status, body) = send(app.clone(), get("/api/certificates/check")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_certificate");

    let (status, body) = send(app, get("/api/certificates/check?certificate=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing_certificate");
}

#[tokio::test]
async fn test_check_returns_priced_certificate() {
    let app = app(FakeCreditService::with_lookup(lookup()), FakeGateway::default());
    let (status, body) = send(app, get("/api/certificates/check?certificate=abcd1234")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isValid"], true);
    let certificate = &body["certificate"];
    assert_eq!(certificate["code"], "ABCD1234");
    assert_eq!(certificate["id"], "4471");
    assert_eq!(certificate["tier"], "TIER_1");
    assert_eq!(certificate["remainingBalance"], 5);
    assert_eq!(certificate["costPerSession"], 55);
    assert_eq!(certificate["totalCost"], 275);
    assert_eq!(certificate["adjustedBalance"], 3);
    assert_eq!(certificate["otherRemainingBalance"], 0);
}

#[tokio::test]
async fn test_check_unknown_certificate_is_404() {
    let app = app(FakeCreditService::default(), FakeGateway::default());
    let (status, body) = send(app, get("/api/certificates/check?certificate=ABCD1234")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "invalid_certificate");
    assert_eq!(body["errorMessage"], "Certificate not found");
}

#[tokio::test]
async fn test_check_malformed_code_is_400() {
    let app = app(FakeCreditService::with_lookup(lookup()), FakeGateway::default());
    let (status, body) = send(app, get("/api/certificates/check?certificate=ABC")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_check_upstream_down_is_502() {
    let credits = FakeCreditService::with_lookup(lookup()).failing_checks(5);
    let app = app(credits, FakeGateway::default());
    let (status, body) = send(app, get("/api/certificates/check?certificate=ABCD1234")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "validation_failed");
}

// =============================================================================
// Conversion
// =============================================================================

#[tokio::test]
async fn test_convert_adjustment() {
    let credits = FakeCreditService::with_lookup(lookup()).issuing(3);
    let app = app(credits, FakeGateway::default());
    let (status, body) = send(app, post_json("/api/certificates/convert", adjustment_body())).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["success"], true);
    assert_eq!(body["certificate"]["code"], "ABCD1234");
    assert_eq!(body["certificate"]["finalBalance"], 3);
}

#[tokio::test]
async fn test_convert_partial_failure_carries_remediation() {
    let credits = FakeCreditService::with_lookup(lookup())
        .failing_create(ConversionError::UpstreamUnavailable("HTTP 500".into()));
    let app = app(credits, FakeGateway::default());
    let (status, body) = send(app, post_json("/api/certificates/convert", adjustment_body())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "partial_failure");
    let remediation = &body["remediation"];
    assert_eq!(remediation["code"], "ABCD1234");
    assert_eq!(remediation["externalId"], "4471");
    assert_eq!(remediation["targetProductId"], 1800003);
    assert_eq!(remediation["email"], "skier@example.com");
    assert_eq!(remediation["finalBalance"], 3);
}

#[tokio::test]
async fn test_convert_unpaid_upgrade_rejected() {
    let mut request = adjustment_body();
    request["conversionType"] = json!("upgrade");
    request["checkoutSessionId"] = json!("cs_open");

    let gateway = FakeGateway::default().with_session("cs_open", false, "ABCD1234", "TIER_1");
    let app = app(FakeCreditService::with_lookup(lookup()), gateway);
    let (status, body) = send(app, post_json("/api/certificates/convert", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "payment_not_completed");
}

#[tokio::test]
async fn test_convert_paid_upgrade() {
    let mut request = adjustment_body();
    request["conversionType"] = json!("upgrade");
    request["checkoutSessionId"] = json!("cs_paid");

    let credits = FakeCreditService::with_lookup(lookup()).issuing(5);
    let gateway = FakeGateway::default().with_session("cs_paid", true, "ABCD1234", "TIER_1");
    let (status, body) = send(app(credits, gateway), post_json("/api/certificates/convert", request)).await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["certificate"]["finalBalance"], 5);
}

#[tokio::test]
async fn test_convert_upgrade_paid_at_other_tier_rejected() {
    let mut request = adjustment_body();
    request["conversionType"] = json!("upgrade");
    request["checkoutSessionId"] = json!("cs_cheap");

    let gateway = FakeGateway::default().with_session("cs_cheap", true, "ABCD1234", "TIER_3");
    let app = app(FakeCreditService::with_lookup(lookup()), gateway);
    let (status, body) = send(app, post_json("/api/certificates/convert", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "payment_not_completed");
}

#[tokio::test]
async fn test_convert_unmapped_balance_is_400() {
    let mut lookup = lookup();
    lookup.remaining_counts.insert("32116738".to_string(), 9);
    let mut request = adjustment_body();
    request["currentBalance"] = json!(9);
    request["adjustedBalance"] = json!(6);

    let app = app(FakeCreditService::with_lookup(lookup), FakeGateway::default());
    let (status, body) = send(app, post_json("/api/certificates/convert", request)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_balance");
    assert_eq!(body["errorMessage"], "No product ID found for 6 sessions");
}

#[tokio::test]
async fn test_convert_malformed_body() {
    let app = app(FakeCreditService::default(), FakeGateway::default());
    let (status, body) = send(
        app,
        post_json("/api/certificates/convert", json!({ "certificateCode": "ABCD1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

// =============================================================================
// Checkout
// =============================================================================

#[tokio::test]
async fn test_checkout_returns_redirect_url() {
    let gateway = FakeGateway::default().with_price("OFFSEASON_UPGRADE_TIER_1", "price_t1");
    let app = app(FakeCreditService::default(), gateway);
    let (status, body) = send(
        app,
        post_json(
            "/api/checkout",
            json!({ "tier": "TIER_1", "certificateCode": "ABCD1234", "email": "skier@example.com" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_1");
}

#[tokio::test]
async fn test_checkout_accepts_numeric_tier() {
    let gateway = FakeGateway::default().with_price("OFFSEASON_UPGRADE_TIER_3", "price_t3");
    let app = app(FakeCreditService::default(), gateway);
    let (status, _) = send(
        app,
        post_json(
            "/api/checkout",
            json!({ "tier": 3, "certificateCode": "ABCD1234", "email": "skier@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_checkout_malformed_email_is_400() {
    let gateway = FakeGateway::default().with_price("OFFSEASON_UPGRADE_TIER_1", "price_t1");
    let app = app(FakeCreditService::default(), gateway);
    let (status, body) = send(
        app,
        post_json(
            "/api/checkout",
            json!({ "tier": "TIER_1", "certificateCode": "ABCD1234", "email": "skier" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_checkout_missing_price_is_500() {
    let app = app(FakeCreditService::default(), FakeGateway::default());
    let (status, body) = send(
        app,
        post_json(
            "/api/checkout",
            json!({ "tier": "TIER_2", "certificateCode": "ABCD1234", "email": "skier@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "price_not_found");
}

// =============================================================================
// Security headers
// =============================================================================

#[tokio::test]
async fn test_security_headers_applied() {
    let app = app(FakeCreditService::default(), FakeGateway::default())
        .layer(middleware::from_fn(security_headers_middleware));
    let response = app.oneshot(get("/health")).await.unwrap();

    let headers = response.headers();
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(headers[header::CACHE_CONTROL], "no-store");
}
