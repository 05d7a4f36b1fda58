//! Tenant routing and cross-tenant credential isolation.

#![allow(clippy::unwrap_used)]

use serde_json::json;
use shopfront_client::{CredentialStore, FileTier, MemoryTier, RequestOptions};
use shopfront_core::{
    CustomerProfileSnapshot, TenantId, TenantSource, UserProfileSnapshot,
};
use shopfront_integration_tests::TestContext;
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, Request, ResponseTemplate};

/// Matches requests sent without a bearer token.
struct Anonymous;

impl Match for Anonymous {
    fn matches(&self, request: &Request) -> bool {
        !request.headers.contains_key("authorization")
    }
}

fn customer_of(domain: &str, id: &str) -> CustomerProfileSnapshot {
    CustomerProfileSnapshot {
        tenant_id: Some(TenantId::new(id)),
        tenant_domain: Some(domain.to_string()),
        ..CustomerProfileSnapshot::default()
    }
}

fn merchant_of(domain: &str) -> UserProfileSnapshot {
    UserProfileSnapshot {
        tenant_domain: Some(domain.to_string()),
        ..UserProfileSnapshot::default()
    }
}

#[tokio::test]
async fn test_subdomain_page_sets_tenant_headers() {
    let ctx = TestContext::new("https://acme.shopfront.app/?tenantId=tnt_acme").await;
    Mock::given(method("GET"))
        .and(path("/storefront/products"))
        .and(header("X-Tenant-Domain", "acme.shopfront.app"))
        .and(header("X-Tenant-Id", "tnt_acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.client
        .execute("/storefront/products", RequestOptions::get())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_query_parameter_names_tenant_on_neutral_host() {
    let ctx = TestContext::new("https://shopfront.app/preview?tenant=globex").await;
    Mock::given(method("GET"))
        .and(header("X-Tenant-Domain", "globex.shopfront.app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.client
        .execute("/storefront/settings", RequestOptions::get())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_customer_of_other_tenant_is_not_sent() {
    let ctx = TestContext::new("https://acme.shopfront.app/cart").await;
    ctx.sign_in_customer("c-globex");
    ctx.client
        .store()
        .set_customer_profile(&customer_of("globex.shopfront.app", "tnt_globex"));

    Mock::given(method("GET"))
        .and(path("/cart"))
        .and(Anonymous)
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let value = ctx.client.execute("/cart", RequestOptions::get()).await.unwrap();
    assert_eq!(value, json!({"items": []}));

    let (tenant, selection) = ctx.client.resolve("/cart").await;
    assert_eq!(tenant.domain, "acme.shopfront.app");
    assert!(!selection.is_authenticated());
}

#[tokio::test]
async fn test_merchant_of_other_tenant_is_not_sent_on_storefront() {
    let ctx = TestContext::new("https://acme.shopfront.app/products").await;
    ctx.sign_in_merchant("m-globex", None);
    ctx.client
        .store()
        .set_merchant_profile(&merchant_of("globex.shopfront.app"));

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(Anonymous)
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let err = ctx
        .client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    // The other tenant's session is untouched.
    assert!(ctx.client.store().merchant_profile().is_some());
}

#[tokio::test]
async fn test_merchant_known_only_by_tenant_id_is_not_sent_elsewhere() {
    let ctx = TestContext::new("https://globex.shopfront.app/products").await;
    ctx.sign_in_merchant("m-acme", None);
    ctx.client.store().set_merchant_profile(&UserProfileSnapshot {
        tenant_id: Some(TenantId::new("tnt_acme")),
        ..UserProfileSnapshot::default()
    });

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("Authorization", "Bearer m-acme"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"leaked": true})))
        .expect(0)
        .mount(&ctx.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(Anonymous)
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let err = ctx
        .client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(ctx.client.store().merchant_profile().is_some());
}

#[tokio::test]
async fn test_dashboard_keeps_merchant_identity() {
    let ctx = TestContext::new("https://acme.shopfront.app/dashboard").await;
    ctx.sign_in_merchant("m-globex", None);
    ctx.client
        .store()
        .set_merchant_profile(&merchant_of("globex.shopfront.app"));

    Mock::given(method("GET"))
        .and(path("/orders"))
        .and(header("Authorization", "Bearer m-globex"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    ctx.client
        .execute("/orders", RequestOptions::get().auth_required())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_neutral_host_falls_back_to_remembered_subdomain() {
    let ctx = TestContext::new("https://acme.shopfront.app/?tenantId=tnt_acme").await;
    let (first, _) = ctx.client.resolve("/cart").await;
    assert_eq!(first.source, TenantSource::Subdomain);

    ctx.client
        .set_page(shopfront_client::PageLocation::parse("https://shopfront.app/checkout").unwrap())
        .await;
    let (tenant, _) = ctx.client.resolve("/cart").await;
    assert_eq!(tenant.source, TenantSource::StoredSubdomain);
    assert_eq!(tenant.domain, "acme.shopfront.app");
    assert_eq!(tenant.tenant_id, Some(TenantId::new("tnt_acme")));
}

#[tokio::test]
async fn test_remembered_tenant_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("session.json");

    let store = CredentialStore::new(FileTier::open(&file).unwrap(), MemoryTier::new());
    let ctx = TestContext::with_store("https://acme.shopfront.app/", store).await;
    ctx.client.resolve("/cart").await;

    let reopened = CredentialStore::new(FileTier::open(&file).unwrap(), MemoryTier::new());
    let ctx = TestContext::with_store("https://shopfront.app/", reopened).await;
    let (tenant, _) = ctx.client.resolve("/cart").await;
    assert_eq!(tenant.domain, "acme.shopfront.app");
}
