//! Request execution.
//!
//! [`ShopfrontClient`] is the single entry point for backend calls. Each
//! request is resolved to a tenant, assigned at most one identity, sent with
//! a bounded timeout, and classified on the way back:
//!
//! - 2xx bodies are unwrapped from `{ success, data }` envelopes; error-shaped
//!   2xx bodies become errors
//! - a 401 on a request that did not require auth drops the rejected
//!   credential and is re-issued as a guest
//! - a 401 for a customer ends the customer session
//! - a 401 for a merchant (or an anonymous request that required auth) goes
//!   through the [`RefreshCoordinator`] and is retried exactly once
//! - everything else maps onto [`ApiError`]
//!
//! Errors are handed to the [`ErrorPresenter`] when one is installed and are
//! always returned to the caller.

pub mod envelope;
pub mod request;

pub use request::{MultipartBody, RequestBody, RequestOptions, Service};

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use shopfront_core::{ClearScope, IdentityKind, TenantContext};

use self::envelope::{parse_body, unwrap_envelope};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::credentials::{CredentialStore, FileTier, MemoryTier, StorageError};
use crate::error::{ApiError, ErrorBody, ErrorMessage};
use crate::identity::{IdentitySelector, RouteTable, Selection};
use crate::page::{CurrentPage, PageLocation};
use crate::presenter::{ErrorContext, ErrorPresenter};
use crate::refresh::{HttpTokenRefresher, RefreshCoordinator, RefreshError, TokenRefresher};
use crate::session::SessionManager;
use crate::tenant::TenantResolver;

/// Header carrying the guest cart continuation token, both ways.
pub const SESSION_HEADER: &str = "X-Session-ID";

/// Errors raised while assembling a client.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The HTTP client could not be created.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The durable credential file could not be opened.
    #[error("Credential storage error: {0}")]
    Storage(#[from] StorageError),
}

/// How a dispatch relates to earlier attempts of the same request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    /// Re-issued without credentials after an opportunistic 401.
    Guest,
    /// Re-issued once after a refresh.
    Retried { unchanged: bool },
}

/// Result of a single send.
enum Step {
    Done(Value),
    /// Send again as described.
    Retry(Attempt),
}

/// A failed dispatch and the identity it was sent with.
struct Failure {
    error: ApiError,
    identity: Option<IdentityKind>,
}

struct RawResponse {
    status: StatusCode,
    retry_after: Option<Duration>,
    text: String,
}

/// Tenant-aware, identity-aware client for the Shopfront backend.
///
/// Cheap to clone; clones share credentials, page and refresh state.
#[derive(Clone)]
pub struct ShopfrontClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    store: CredentialStore,
    resolver: TenantResolver,
    selector: IdentitySelector,
    coordinator: RefreshCoordinator,
    page: CurrentPage,
    presenter: Option<ErrorPresenter>,
}

impl ShopfrontClient {
    /// Start building a client.
    #[must_use]
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The credential store shared with the session manager.
    #[must_use]
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// Handle to the page the user is on.
    #[must_use]
    pub fn page(&self) -> &CurrentPage {
        &self.inner.page
    }

    #[must_use]
    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.inner.coordinator
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    /// Login and logout operations over this client's store.
    #[must_use]
    pub fn session(&self) -> SessionManager {
        SessionManager::new(self.clone())
    }

    /// Record a navigation.
    pub async fn set_page(&self, location: PageLocation) {
        self.inner.page.set(location).await;
    }

    /// Tenant and identity a request to `path` would use right now.
    pub async fn resolve(&self, path: &str) -> (TenantContext, Selection) {
        let page = self.inner.page.snapshot().await;
        let tenant = self.inner.resolver.resolve(&page, &self.inner.store);
        let selection =
            self.inner
                .selector
                .select(path, None, &tenant, &page, &self.inner.store);
        (tenant, selection)
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Execute a request and decode the unwrapped payload into `T`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`]; `ApiError::Decode` if the payload
    /// does not match `T`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let value = self.execute(path, options.clone()).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(decoded),
            Err(e) => {
                let error = ApiError::Decode {
                    status: 200,
                    message: e.to_string(),
                };
                let page = self.inner.page.snapshot().await;
                self.report(&error, path, &options, &page, None);
                Err(error)
            }
        }
    }

    /// Execute a request and return the unwrapped JSON payload.
    ///
    /// `204`/`205` and empty bodies yield `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`].
    #[instrument(skip(self, options), fields(method = %options.method, service = ?options.service))]
    pub async fn execute(&self, path: &str, options: RequestOptions) -> Result<Value, ApiError> {
        let page = self.inner.page.snapshot().await;
        let mut attempt = Attempt::First;
        loop {
            match self.dispatch(path, &options, &page, attempt).await {
                Ok(Step::Done(value)) => return Ok(value),
                Ok(Step::Retry(next)) => attempt = next,
                Err(Failure { error, identity }) => {
                    self.report(&error, path, &options, &page, identity);
                    return Err(error);
                }
            }
        }
    }

    fn report(
        &self,
        error: &ApiError,
        path: &str,
        options: &RequestOptions,
        page: &PageLocation,
        identity: Option<IdentityKind>,
    ) {
        if matches!(error, ApiError::NotFound(_)) && !options.auth_required {
            debug!(path, "Resource not found");
        } else {
            warn!(path, status = error.status(), error = %error, "Request failed");
        }

        if let Some(presenter) = &self.inner.presenter {
            presenter.present(
                error,
                &ErrorContext {
                    path,
                    page,
                    auth_required: options.auth_required,
                    suppress: options.suppress_errors,
                    identity,
                },
            );
        }
    }

    /// Send once. Only a first attempt can ask for another; guest and
    /// post-refresh attempts always settle.
    async fn dispatch(
        &self,
        path: &str,
        options: &RequestOptions,
        page: &PageLocation,
        attempt: Attempt,
    ) -> Result<Step, Failure> {
        let inner = &self.inner;
        let tenant = inner.resolver.resolve(page, &inner.store);
        let mut selection = self.select(path, options, &tenant, page, attempt);

        if attempt == Attempt::First
            && selection.identity == Some(IdentityKind::Merchant)
            && inner.coordinator.needs_refresh()
        {
            debug!("Merchant access token expiring, refreshing before send");
            if let Err(e) = inner.coordinator.refresh(selection.token.as_ref()).await {
                debug!(error = %e, "Proactive refresh failed");
            }
            selection = self.select(path, options, &tenant, page, attempt);
        }

        let identity = selection.identity;
        let fail = |error| Failure { error, identity };

        debug!(
            tenant = %tenant.domain,
            tenant_source = %tenant.source,
            identity = ?identity,
            ?attempt,
            "Sending request"
        );
        let response = self
            .send(path, options, &tenant, &selection)
            .await
            .map_err(fail)?;

        if response.status == StatusCode::UNAUTHORIZED {
            let body = ErrorBody::from_text(401, &response.text);
            return self
                .handle_unauthorized(path, attempt, options, &selection, body)
                .await;
        }

        if response.status.is_success() {
            return decode_success(&response).map(Step::Done).map_err(fail);
        }

        let body = ErrorBody::from_text(response.status.as_u16(), &response.text);
        Err(fail(ApiError::from_status(body, response.retry_after)))
    }

    fn select(
        &self,
        path: &str,
        options: &RequestOptions,
        tenant: &TenantContext,
        page: &PageLocation,
        attempt: Attempt,
    ) -> Selection {
        let selector = &self.inner.selector;
        if options.anonymous || attempt == Attempt::Guest {
            return Selection::anonymous(selector.routes().classify(path));
        }
        selector.select(
            path,
            options.credential.as_ref(),
            tenant,
            page,
            &self.inner.store,
        )
    }

    async fn handle_unauthorized(
        &self,
        path: &str,
        attempt: Attempt,
        options: &RequestOptions,
        selection: &Selection,
        body: ErrorBody,
    ) -> Result<Step, Failure> {
        let identity = selection.identity;
        let coordinator = &self.inner.coordinator;

        if options.anonymous {
            return Err(Failure {
                error: ApiError::AuthRequired(body),
                identity: None,
            });
        }

        if identity == Some(IdentityKind::Explicit) {
            return Err(Failure {
                error: ApiError::AuthFailed {
                    identity: IdentityKind::Explicit,
                    body,
                },
                identity,
            });
        }

        match attempt {
            Attempt::Guest => {
                return Err(Failure {
                    error: ApiError::AuthRequired(body),
                    identity: None,
                });
            }
            Attempt::Retried { unchanged } => {
                let error = match identity {
                    Some(IdentityKind::Merchant) if unchanged => {
                        coordinator.abandon_session();
                        ApiError::SessionInvalidLoop
                    }
                    Some(kind) => {
                        let scope = if kind == IdentityKind::Customer {
                            ClearScope::Customer
                        } else {
                            ClearScope::Merchant
                        };
                        coordinator.expire_session(scope).await;
                        ApiError::AuthFailed {
                            identity: kind,
                            body,
                        }
                    }
                    None => ApiError::AuthRequired(body),
                };
                return Err(Failure { error, identity });
            }
            Attempt::First => {}
        }

        if !options.auth_required {
            let Some(kind) = identity else {
                return Err(Failure {
                    error: ApiError::AuthRequired(body),
                    identity: None,
                });
            };
            info!(identity = %kind, path, "Stored credential rejected, retrying as guest");
            match kind {
                IdentityKind::Customer => self.inner.store.clear(ClearScope::Customer),
                IdentityKind::Merchant => {
                    coordinator.expire_session(ClearScope::Merchant).await;
                }
                IdentityKind::Explicit => {}
            }
            return Ok(Step::Retry(Attempt::Guest));
        }

        if identity == Some(IdentityKind::Customer) {
            info!(path, "Customer session rejected");
            self.inner.store.clear(ClearScope::Customer);
            return Err(Failure {
                error: ApiError::AuthFailed {
                    identity: IdentityKind::Customer,
                    body,
                },
                identity,
            });
        }

        match coordinator.refresh(selection.token.as_ref()).await {
            Ok(refreshed) => {
                debug!(unchanged = refreshed.unchanged, "Retrying after refresh");
                Ok(Step::Retry(Attempt::Retried {
                    unchanged: refreshed.unchanged,
                }))
            }
            Err(RefreshError::NoRefreshToken) => {
                if identity.is_some() {
                    coordinator.expire_session(ClearScope::Merchant).await;
                }
                Err(Failure {
                    error: ApiError::AuthRequired(body),
                    identity,
                })
            }
            Err(e) => {
                debug!(error = %e, "Refresh did not recover the session");
                Err(Failure {
                    error: ApiError::AuthExpired {
                        identity: IdentityKind::Merchant,
                        body,
                    },
                    identity,
                })
            }
        }
    }

    async fn send(
        &self,
        path: &str,
        options: &RequestOptions,
        tenant: &TenantContext,
        selection: &Selection,
    ) -> Result<RawResponse, ApiError> {
        let url = self.url_for(options, path)?;
        let mut builder = self
            .inner
            .http
            .request(options.method.clone(), url)
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-Tenant-Domain", tenant.domain.as_str());

        if let Some(tenant_id) = &tenant.tenant_id {
            builder = builder.header("X-Tenant-Id", tenant_id.as_str());
        }
        if let Some(session_id) = self.inner.store.guest_session_id() {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        if let Some(token) = &selection.token {
            builder = builder.bearer_auth(token.expose_secret());
        }

        builder = match &options.body {
            Some(RequestBody::Multipart(body)) => {
                let form = body.to_form().map_err(|e| {
                    ApiError::Validation(ErrorBody {
                        status: 0,
                        message: Some(ErrorMessage::Single(format!(
                            "invalid multipart body: {e}"
                        ))),
                        data: None,
                    })
                })?;
                builder.multipart(form)
            }
            Some(RequestBody::Json(value)) => builder.json(value),
            None => builder.header(CONTENT_TYPE, "application/json"),
        };
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, headers, text))
        };

        let (status, headers, text) = match tokio::time::timeout(timeout, exchange).await {
            Err(_) => return Err(ApiError::Timeout(timeout)),
            Ok(Err(e)) if e.is_timeout() => return Err(ApiError::Timeout(timeout)),
            Ok(Err(e)) => return Err(ApiError::Network(e.to_string())),
            Ok(Ok(parts)) => parts,
        };

        self.capture_session_id(&headers);

        Ok(RawResponse {
            status,
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
            text,
        })
    }

    fn capture_session_id(&self, headers: &HeaderMap) {
        if let Some(session_id) = headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        {
            self.inner.store.set_guest_session_id(session_id);
        }
    }

    fn url_for(&self, options: &RequestOptions, path: &str) -> Result<Url, ApiError> {
        let base = match options.service {
            Service::Core => &self.inner.config.api_base_url,
            Service::Identity => &self.inner.config.identity_base_url,
        };
        let separator = if path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{base}{separator}{path}"))
            .map_err(|e| ApiError::Network(format!("invalid request URL: {e}")))?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&options.query);
        }
        Ok(url)
    }
}

impl std::fmt::Debug for ShopfrontClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopfrontClient")
            .field("api_base_url", &self.inner.config.api_base_url)
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

fn decode_success(response: &RawResponse) -> Result<Value, ApiError> {
    if matches!(response.status.as_u16(), 204 | 205) {
        return Ok(Value::Null);
    }
    unwrap_envelope(parse_body(&response.text)).map_err(|body| ApiError::from_status(body, None))
}

// =============================================================================
// Builder
// =============================================================================

/// Assembles a [`ShopfrontClient`] from configuration and collaborators.
pub struct ClientBuilder {
    config: ClientConfig,
    store: Option<CredentialStore>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    clock: Arc<dyn Clock>,
    routes: RouteTable,
    page: Option<CurrentPage>,
    presenter: Option<ErrorPresenter>,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            store: None,
            refresher: None,
            clock: Arc::new(SystemClock),
            routes: RouteTable::default(),
            page: None,
            presenter: None,
            http: None,
        }
    }

    /// Use this credential store instead of one derived from the config.
    #[must_use]
    pub fn store(mut self, store: CredentialStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a custom refresh-token exchange.
    #[must_use]
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the endpoint classification table.
    #[must_use]
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Share a page handle with the host application.
    #[must_use]
    pub fn page(mut self, page: CurrentPage) -> Self {
        self.page = Some(page);
        self
    }

    #[must_use]
    pub fn presenter(mut self, presenter: ErrorPresenter) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Use a preconfigured HTTP client.
    #[must_use]
    pub fn http(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Build the client.
    ///
    /// Without an explicit store, the durable tier is the file named by
    /// `storage_path`, or memory when unset.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// credential file cannot be read.
    pub fn build(self) -> Result<ShopfrontClient, BuildError> {
        let http = match self.http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("shopfront-client/", env!("CARGO_PKG_VERSION")))
                .build()?,
        };

        let store = match (self.store, &self.config.storage_path) {
            (Some(store), _) => store,
            (None, Some(path)) => CredentialStore::new(FileTier::open(path)?, MemoryTier::new()),
            (None, None) => CredentialStore::in_memory(),
        };

        let refresher = self.refresher.unwrap_or_else(|| {
            Arc::new(HttpTokenRefresher::new(
                http.clone(),
                &self.config.identity_base_url,
                &self.config.auth_endpoints.refresh,
            ))
        });

        let page = self.page.unwrap_or_default();
        let coordinator = RefreshCoordinator::new(
            store.clone(),
            refresher,
            self.clock,
            page.clone(),
            self.config.pages.clone(),
        );

        Ok(ShopfrontClient {
            inner: Arc::new(ClientInner {
                resolver: TenantResolver::new(self.config.tenancy.clone()),
                selector: IdentitySelector::new(self.routes, self.config.pages.clone()),
                http,
                store,
                coordinator,
                page,
                presenter: self.presenter,
                config: self.config,
            }),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use serde::Deserialize;
    use serde_json::json;
    use shopfront_core::{CredentialKind, TenantId, UserProfileSnapshot};
    use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn client_for(server: &MockServer, page_url: &str) -> ShopfrontClient {
        let config = ClientConfig::new(&server.uri(), &server.uri(), "shopfront.app").unwrap();
        let client = ShopfrontClient::builder(config).build().unwrap();
        client
            .set_page(PageLocation::parse(page_url).unwrap())
            .await;
        client
    }

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[tokio::test]
    async fn test_headers_and_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .and(header("X-Tenant-Domain", "acme.shopfront.app"))
            .and(header("X-Requested-With", "XMLHttpRequest"))
            .and(header("Content-Type", "application/json"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": [{"id": "p1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "http://acme.localhost:3000/").await;
        let value = client
            .execute("/products", RequestOptions::get().query("page", "2"))
            .await
            .unwrap();
        assert_eq!(value, json!([{"id": "p1"}]));
    }

    #[tokio::test]
    async fn test_typed_request() {
        #[derive(Debug, Deserialize)]
        struct Product {
            id: String,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        let product: Product = client
            .request("/products/p1", RequestOptions::get())
            .await
            .unwrap();
        assert_eq!(product.id, "p1");

        let err = client
            .request::<Vec<Product>>("/products/p1", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        let value = client
            .execute("/products/p1", RequestOptions::delete())
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_json_body_and_tenant_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products"))
            .and(header("X-Tenant-Id", "tnt_a"))
            .and(body_json(json!({"name": "Tee"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p2"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/dashboard").await;
        client.store().set_merchant_profile(&UserProfileSnapshot {
            tenant_id: Some(TenantId::new("tnt_a")),
            tenant_domain: Some("acme.shopfront.app".to_string()),
            ..UserProfileSnapshot::default()
        });
        client
            .execute("/products", RequestOptions::post(&json!({"name": "Tee"})))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_shaped_success_is_promoted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statusCode": 422,
                "message": ["name is required"]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        let err = client
            .execute("/products", RequestOptions::post(&json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(err.status(), 422);
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        Mock::given(path("/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(path("/busy"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;
        Mock::given(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        let run = |p: &'static str| {
            let client = client.clone();
            async move { client.execute(p, RequestOptions::get()).await.unwrap_err() }
        };

        assert!(matches!(run("/forbidden").await, ApiError::Forbidden(_)));
        assert!(matches!(run("/missing").await, ApiError::NotFound(_)));
        assert!(matches!(
            run("/busy").await,
            ApiError::RateLimited { retry_after: Some(d), .. } if d == Duration::from_secs(7)
        ));
        let server_error = run("/broken").await;
        assert!(matches!(server_error, ApiError::Server(_)));
        assert_eq!(server_error.message(), "boom");
    }

    #[tokio::test]
    async fn test_timeout_has_status_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        let err = client
            .execute(
                "/slow",
                RequestOptions::get().timeout(Duration::from_millis(50)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Timeout(_)));
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn test_network_error() {
        let config =
            ClientConfig::new("http://127.0.0.1:9", "http://127.0.0.1:9", "shopfront.app").unwrap();
        let client = ShopfrontClient::builder(config).build().unwrap();
        let err = client
            .execute("/products", RequestOptions::get())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Network(_) | ApiError::Timeout(_)));
        assert_eq!(err.status(), 0);
    }

    #[tokio::test]
    async fn test_session_id_captured_and_sent() {
        let server = MockServer::start().await;
        Mock::given(path("/cart"))
            .and(header_exists("X-Session-ID"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/cart"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Session-ID", "guest-42")
                    .set_body_json(json!({"items": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        client.execute("/cart", RequestOptions::get()).await.unwrap();
        assert_eq!(client.store().guest_session_id().as_deref(), Some("guest-42"));
        client.execute("/cart", RequestOptions::get()).await.unwrap();
    }

    #[tokio::test]
    async fn test_opportunistic_credential_retries_as_guest() {
        let server = MockServer::start().await;
        Mock::given(path("/cart"))
            .and(header("Authorization", "Bearer c-old"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/cart"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        client
            .store()
            .set(CredentialKind::CustomerAccess, &secret("c-old"));

        let value = client.execute("/cart", RequestOptions::get()).await.unwrap();
        assert_eq!(value, json!({"items": []}));
        assert!(client.store().get(CredentialKind::CustomerAccess).is_none());
    }

    #[tokio::test]
    async fn test_anonymous_request_is_sent_once_without_credentials() {
        let server = MockServer::start().await;
        Mock::given(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/login").await;
        client
            .store()
            .set(CredentialKind::CustomerAccess, &secret("c-1"));

        let err = client
            .execute(
                "/auth/login",
                RequestOptions::post(&json!({"email": "a@b.test"})).anonymous(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::AuthRequired(_)));
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests.first().unwrap().headers.contains_key("authorization"));
        assert!(client.store().get(CredentialKind::CustomerAccess).is_some());
    }

    #[tokio::test]
    async fn test_customer_auth_failure_clears_only_customer() {
        let server = MockServer::start().await;
        Mock::given(path("/customers/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/account").await;
        let store = client.store();
        store.set(CredentialKind::CustomerAccess, &secret("c"));
        store.set(CredentialKind::MerchantAccess, &secret("m"));

        let err = client
            .execute("/customers/me", RequestOptions::get().auth_required())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::AuthFailed {
                identity: IdentityKind::Customer,
                ..
            }
        ));
        assert!(store.get(CredentialKind::CustomerAccess).is_none());
        assert!(store.get(CredentialKind::MerchantAccess).is_some());
    }

    #[tokio::test]
    async fn test_explicit_credential_401_clears_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer caller"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/").await;
        client
            .store()
            .set(CredentialKind::MerchantAccess, &secret("m"));

        let err = client
            .execute(
                "/orders",
                RequestOptions::get()
                    .auth_required()
                    .credential(secret("caller")),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::AuthFailed {
                identity: IdentityKind::Explicit,
                ..
            }
        ));
        assert!(client.store().get(CredentialKind::MerchantAccess).is_some());
    }

    #[tokio::test]
    async fn test_merchant_refresh_then_single_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "m-new"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/orders"))
            .and(header("Authorization", "Bearer m-new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/dashboard/orders").await;
        client
            .store()
            .set(CredentialKind::MerchantAccess, &secret("m-old"));
        client
            .store()
            .set(CredentialKind::MerchantRefresh, &secret("r"));

        let value = client
            .execute("/orders", RequestOptions::get().auth_required())
            .await
            .unwrap();
        assert_eq!(value, json!([]));
    }

    #[tokio::test]
    async fn test_merchant_without_refresh_token_is_auth_required() {
        let server = MockServer::start().await;
        Mock::given(path("/orders"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, "https://acme.shopfront.app/products").await;
        client
            .store()
            .set(CredentialKind::MerchantAccess, &secret("m"));

        let err = client
            .execute("/orders", RequestOptions::get().auth_required())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthRequired(_)));
        assert!(client.store().get(CredentialKind::MerchantAccess).is_none());
    }

    #[tokio::test]
    async fn test_build_with_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config =
            ClientConfig::new("https://api.shopfront.app", "https://id.shopfront.app", "shopfront.app")
                .unwrap();
        config.storage_path = Some(dir.path().join("session.json"));

        let client = ShopfrontClient::builder(config.clone()).build().unwrap();
        client
            .store()
            .set(CredentialKind::MerchantAccess, &secret("persisted"));

        let reopened = ShopfrontClient::builder(config).build().unwrap();
        assert!(reopened.store().get(CredentialKind::MerchantAccess).is_some());
    }
}
