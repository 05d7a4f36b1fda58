//! Session refresh through the request pipeline.
//!
//! Covers single-flight refresh under concurrency, the one-retry bound, the
//! refreshed-token loop guard, the protected-page clear policy and
//! proactive refresh of expiring tokens.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use shopfront_client::{
    ApiError, ClientConfig, DefaultTranslator, ErrorPresenter, FixedClock, Navigator, Notifier,
    NotifyLevel, PageLocation, RequestOptions, ShopfrontClient,
};
use shopfront_core::{CredentialKind, IdentityKind};
use shopfront_integration_tests::{PLATFORM_DOMAIN, TestContext, jwt_expiring_at, secret};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

const DASHBOARD: &str = "https://acme.shopfront.app/dashboard/orders";
const STOREFRONT: &str = "https://acme.shopfront.app/products";

async fn mount_refresh(ctx: &TestContext, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(100))
                .set_body_json(json!({"success": true, "data": {"accessToken": access_token}})),
        )
        .expect(expected_calls)
        .mount(&ctx.server)
        .await;
}

// ============================================================================
// Single flight
// ============================================================================

#[tokio::test]
async fn test_concurrent_401s_share_one_refresh() {
    let ctx = TestContext::new(DASHBOARD).await;
    ctx.sign_in_merchant("m-old", Some("r-1"));

    mount_refresh(&ctx, "m-new", 1).await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("Authorization", "Bearer m-new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": []})))
        .expect(5)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1..=5)
        .mount(&ctx.server)
        .await;

    let request = || {
        let client = ctx.client.clone();
        async move {
            client
                .execute("/orders", RequestOptions::get().auth_required())
                .await
        }
    };
    let (a, b, c, d, e) = tokio::join!(request(), request(), request(), request(), request());

    for result in [a, b, c, d, e] {
        assert_eq!(result.unwrap(), json!([]));
    }
    let stored = ctx.client.store().get(CredentialKind::MerchantAccess).unwrap();
    assert!(stored.same_token(&secret("m-new")));
    assert!(!ctx.client.coordinator().is_refreshing().await);
}

// ============================================================================
// Retry bound and loop guard
// ============================================================================

#[tokio::test]
async fn test_request_is_retried_at_most_once() {
    let ctx = TestContext::new(STOREFRONT).await;
    ctx.sign_in_merchant("m-old", Some("r-1"));

    mount_refresh(&ctx, "m-new", 1).await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&ctx.server)
        .await;

    let err = ctx
        .client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::AuthFailed {
            identity: IdentityKind::Merchant,
            ..
        }
    ));
    assert!(ctx.client.store().get(CredentialKind::MerchantAccess).is_none());
}

#[tokio::test]
async fn test_unchanged_token_rejected_again_ends_session() {
    let ctx = TestContext::new(DASHBOARD).await;
    ctx.sign_in_merchant("m-same", Some("r-1"));
    ctx.sign_in_customer("c-1");

    mount_refresh(&ctx, "m-same", 1).await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&ctx.server)
        .await;

    let err = ctx
        .client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::SessionInvalidLoop));
    assert_eq!(err.status(), 401);
    let store = ctx.client.store();
    // Cleared even on a protected page.
    for kind in CredentialKind::ALL {
        assert!(store.get(kind).is_none(), "{kind:?} survived the loop guard");
    }
}

// ============================================================================
// Clear policy
// ============================================================================

#[derive(Default)]
struct Recorder {
    notifications: Mutex<Vec<(NotifyLevel, String)>>,
    redirects: Mutex<Vec<String>>,
}

impl Notifier for Recorder {
    fn notify(&self, level: NotifyLevel, title: &str, _description: &str) {
        self.notifications
            .lock()
            .unwrap()
            .push((level, title.to_string()));
    }
}

impl Navigator for Recorder {
    fn redirect_to(&self, path: &str) {
        self.redirects.lock().unwrap().push(path.to_string());
    }
}

async fn client_with_presenter(
    server: &wiremock::MockServer,
    page_url: &str,
) -> (ShopfrontClient, Arc<Recorder>) {
    let config = ClientConfig::new(&server.uri(), &server.uri(), PLATFORM_DOMAIN).unwrap();
    let recorder = Arc::new(Recorder::default());
    let presenter = ErrorPresenter::new(
        Arc::new(DefaultTranslator::default()),
        recorder.clone(),
        recorder.clone(),
        config.pages.clone(),
    );
    let client = ShopfrontClient::builder(config)
        .presenter(presenter)
        .build()
        .unwrap();
    client.set_page(PageLocation::parse(page_url).unwrap()).await;
    (client, recorder)
}

#[tokio::test]
async fn test_rejected_refresh_on_protected_page_keeps_session() {
    let server = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/products/p1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let (client, recorder) = client_with_presenter(&server, "https://acme.shopfront.app/dashboard/products/p1").await;
    client
        .store()
        .set(CredentialKind::MerchantAccess, &secret("m-old"));
    client
        .store()
        .set(CredentialKind::MerchantRefresh, &secret("r-1"));

    let err = client
        .execute(
            "/products/p1",
            RequestOptions::put(&json!({"title": "Unsaved edit"})).auth_required(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::AuthExpired {
            identity: IdentityKind::Merchant,
            ..
        }
    ));
    assert!(client.store().get(CredentialKind::MerchantAccess).is_some());
    assert!(client.store().get(CredentialKind::MerchantRefresh).is_some());
    assert!(recorder.redirects.lock().unwrap().is_empty());
    assert_eq!(recorder.notifications.lock().unwrap().len(), 1);
    assert_eq!(
        client.page().snapshot().await.path(),
        "/dashboard/products/p1"
    );
}

#[tokio::test]
async fn test_rejected_refresh_elsewhere_clears_and_redirects() {
    let server = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let (client, recorder) = client_with_presenter(&server, "https://acme.shopfront.app/reports").await;
    client
        .store()
        .set(CredentialKind::MerchantAccess, &secret("m-old"));
    client
        .store()
        .set(CredentialKind::MerchantRefresh, &secret("r-1"));

    let err = client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();

    assert!(err.is_auth());
    assert!(client.store().get(CredentialKind::MerchantAccess).is_none());
    assert!(client.store().get(CredentialKind::MerchantRefresh).is_none());
    let redirects = recorder.redirects.lock().unwrap();
    assert_eq!(redirects.len(), 1);
    assert!(redirects[0].starts_with("/login?redirect="));
}

#[tokio::test]
async fn test_invalid_session_redirects_from_dashboard() {
    let server = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "m-same"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&server)
        .await;

    let (client, recorder) = client_with_presenter(&server, DASHBOARD).await;
    client
        .store()
        .set(CredentialKind::MerchantAccess, &secret("m-same"));
    client
        .store()
        .set(CredentialKind::MerchantRefresh, &secret("r-1"));

    let err = client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::SessionInvalidLoop));
    assert_eq!(
        recorder.redirects.lock().unwrap().as_slice(),
        ["/login?redirect=%2Fdashboard%2Forders"]
    );
}

// ============================================================================
// Proactive refresh
// ============================================================================

#[tokio::test]
async fn test_expiring_token_is_refreshed_before_send() {
    let now: DateTime<Utc> = DateTime::from_timestamp(1_760_000_000, 0).unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let ctx = TestContext::with_clock(DASHBOARD, clock).await;

    let expiring = jwt_expiring_at(now + chrono::Duration::seconds(10), "old");
    let fresh = jwt_expiring_at(now + chrono::Duration::hours(1), "new");
    ctx.sign_in_merchant(&expiring, Some("r-1"));

    mount_refresh(&ctx, &fresh, 1).await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("Authorization", format!("Bearer {fresh}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let value = ctx
        .client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap();
    assert_eq!(value, json!([]));
}
