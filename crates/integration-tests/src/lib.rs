//! Integration tests for the Shopfront client.
//!
//! Every test runs the real client against a [`wiremock`] server standing in
//! for both the core and the identity service, so no external services are
//! needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopfront-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `refresh` - Single-flight refresh, retry bound and the loop guard
//! - `tenancy` - Tenant headers and cross-tenant credential isolation
//! - `responses` - Envelopes, error classification, timeouts, guest sessions

use std::sync::{Arc, Once};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde_json::json;
use shopfront_client::{
    ClientConfig, CredentialStore, FixedClock, PageLocation, ShopfrontClient,
};
use shopfront_core::CredentialKind;
use wiremock::MockServer;

/// Platform root used by every test.
pub const PLATFORM_DOMAIN: &str = "shopfront.app";

static TRACING: Once = Once::new();

/// Route client logs to the test harness once per binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "shopfront_client=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A mock backend and a client pointed at it.
pub struct TestContext {
    pub server: MockServer,
    pub client: ShopfrontClient,
}

impl TestContext {
    /// Start a mock server and build a client whose page is `page_url`.
    ///
    /// # Panics
    ///
    /// Panics if the page URL or the client configuration is invalid.
    pub async fn new(page_url: &str) -> Self {
        Self::with_store(page_url, CredentialStore::in_memory()).await
    }

    /// Like [`TestContext::new`] with a caller-provided store.
    ///
    /// # Panics
    ///
    /// Panics if the page URL or the client configuration is invalid.
    #[allow(clippy::unwrap_used)]
    pub async fn with_store(page_url: &str, store: CredentialStore) -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let config = ClientConfig::new(&server.uri(), &server.uri(), PLATFORM_DOMAIN).unwrap();
        let client = ShopfrontClient::builder(config)
            .store(store)
            .build()
            .unwrap();
        client.set_page(PageLocation::parse(page_url).unwrap()).await;
        Self { server, client }
    }

    /// Like [`TestContext::new`] with a manually driven clock.
    ///
    /// # Panics
    ///
    /// Panics if the page URL or the client configuration is invalid.
    #[allow(clippy::unwrap_used)]
    pub async fn with_clock(page_url: &str, clock: Arc<FixedClock>) -> Self {
        init_tracing();
        let server = MockServer::start().await;
        let config = ClientConfig::new(&server.uri(), &server.uri(), PLATFORM_DOMAIN).unwrap();
        let client = ShopfrontClient::builder(config).clock(clock).build().unwrap();
        client.set_page(PageLocation::parse(page_url).unwrap()).await;
        Self { server, client }
    }

    /// Store a merchant access token and, optionally, a refresh token.
    pub fn sign_in_merchant(&self, access: &str, refresh: Option<&str>) {
        let store = self.client.store();
        store.set(CredentialKind::MerchantAccess, &secret(access));
        if let Some(refresh) = refresh {
            store.set(CredentialKind::MerchantRefresh, &secret(refresh));
        }
    }

    /// Store a customer access token.
    pub fn sign_in_customer(&self, access: &str) {
        self.client
            .store()
            .set(CredentialKind::CustomerAccess, &secret(access));
    }
}

/// Wrap a literal token.
#[must_use]
pub fn secret(token: &str) -> SecretString {
    SecretString::from(token.to_string())
}

/// An unsigned JWT expiring at `exp`; `marker` keeps tokens distinct.
#[must_use]
pub fn jwt_expiring_at(exp: DateTime<Utc>, marker: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = json!({ "exp": exp.timestamp(), "sub": marker });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
