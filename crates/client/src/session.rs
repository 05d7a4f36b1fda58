//! Session establishment and teardown.
//!
//! Login screens and logout buttons are the only places credentials enter or
//! leave the store outside of the refresh and clear policies. Each operation
//! keeps the Sentry user context in step with the stored identity.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use shopfront_core::{
    ClearScope, CredentialKind, CustomerProfileSnapshot, IdentityKind, UserProfileSnapshot,
};

use crate::error::ApiError;
use crate::executor::{RequestOptions, Service, ShopfrontClient};

/// Tokens issued by a merchant login.
#[derive(Clone)]
pub struct MerchantTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl std::fmt::Debug for MerchantTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Identity service login response, after envelope unwrapping.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    user: UserProfileSnapshot,
}

/// Login and logout over a client's credential store.
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: ShopfrontClient,
}

impl SessionManager {
    #[must_use]
    pub const fn new(client: ShopfrontClient) -> Self {
        Self { client }
    }

    /// Log a merchant in with email and password.
    ///
    /// Replaces any stored merchant session; customer credentials are kept.
    ///
    /// # Errors
    ///
    /// `ApiError::AuthFailed` for bad credentials, `ApiError::Decode` if the
    /// identity service answers without a token, or any transport error.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn login_merchant(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<UserProfileSnapshot, ApiError> {
        self.client.store().clear(ClearScope::Merchant);

        let path = self.client.config().auth_endpoints.login.clone();
        let body = json!({ "email": email, "password": password.expose_secret() });
        let result = self
            .client
            .request::<LoginResponse>(
                &path,
                RequestOptions::post(&body)
                    .service(Service::Identity)
                    .anonymous()
                    .suppress_errors(),
            )
            .await;

        let response = match result {
            Ok(response) => response,
            Err(ApiError::AuthRequired(body) | ApiError::AuthFailed { body, .. }) => {
                return Err(ApiError::AuthFailed {
                    identity: IdentityKind::Merchant,
                    body,
                });
            }
            Err(e) => return Err(e),
        };

        if response.access_token.is_empty() {
            return Err(ApiError::Decode {
                status: 200,
                message: "login response carried an empty access token".to_string(),
            });
        }

        let mut profile = response.user;
        if profile.email.is_none() {
            profile.email = Some(email.to_string());
        }
        self.establish_merchant(
            &MerchantTokens {
                access_token: SecretString::from(response.access_token),
                refresh_token: response
                    .refresh_token
                    .filter(|t| !t.is_empty())
                    .map(SecretString::from),
            },
            &profile,
        );
        Ok(profile)
    }

    /// Store a merchant session obtained elsewhere (e.g. a magic link).
    pub fn establish_merchant(&self, tokens: &MerchantTokens, profile: &UserProfileSnapshot) {
        let store = self.client.store();
        store.set(CredentialKind::MerchantAccess, &tokens.access_token);
        match &tokens.refresh_token {
            Some(refresh) => store.set(CredentialKind::MerchantRefresh, refresh),
            None => store.remove_credential(CredentialKind::MerchantRefresh),
        }
        store.set_merchant_profile(profile);

        info!(
            user_id = profile.user_id.as_ref().map(|id| id.as_str()),
            role = %profile.role,
            "Merchant session established"
        );
        if let Some(user_id) = &profile.user_id {
            set_sentry_user(user_id.as_str(), profile.email.as_deref());
        }
    }

    /// Store a customer session.
    pub fn establish_customer(&self, token: &SecretString, profile: &CustomerProfileSnapshot) {
        let store = self.client.store();
        store.set(CredentialKind::CustomerAccess, token);
        store.set_customer_profile(profile);

        info!(
            customer_id = profile.customer_id.as_ref().map(|id| id.as_str()),
            "Customer session established"
        );
        if let Some(customer_id) = &profile.customer_id {
            set_sentry_user(customer_id.as_str(), profile.email.as_deref());
        }
    }

    /// End the merchant session.
    pub fn logout_merchant(&self) {
        self.logout(ClearScope::Merchant);
    }

    /// End the customer session.
    pub fn logout_customer(&self) {
        self.logout(ClearScope::Customer);
    }

    /// End every session.
    pub fn logout_all(&self) {
        self.logout(ClearScope::All);
    }

    fn logout(&self, scope: ClearScope) {
        self.client.store().clear(scope);
        info!(?scope, "Logged out");
        clear_sentry_user();
    }
}

/// Associate subsequent Sentry events with a user.
fn set_sentry_user(user_id: &str, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use shopfront_core::{MerchantRole, TenantId};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ClientConfig;
    use crate::page::PageLocation;

    /// Matches requests sent without a bearer token.
    struct Anonymous;

    impl wiremock::Match for Anonymous {
        fn matches(&self, request: &wiremock::Request) -> bool {
            !request.headers.contains_key("authorization")
        }
    }

    async fn session_for(server: &MockServer) -> SessionManager {
        let config = ClientConfig::new(&server.uri(), &server.uri(), "shopfront.app").unwrap();
        let client = ShopfrontClient::builder(config).build().unwrap();
        client
            .set_page(PageLocation::parse("https://shopfront.app/login").unwrap())
            .await;
        client.session()
    }

    #[tokio::test]
    async fn test_login_stores_tokens_and_profile() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({"email": "owner@acme.test", "password": "hunter2"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "accessToken": "m-access",
                    "refreshToken": "m-refresh",
                    "user": {
                        "userId": "usr_1",
                        "tenantId": "tnt_a",
                        "tenantDomain": "acme.shopfront.app",
                        "role": "owner"
                    }
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let profile = session
            .login_merchant("owner@acme.test", &SecretString::from("hunter2".to_string()))
            .await
            .unwrap();

        assert_eq!(profile.role, MerchantRole::Owner);
        assert_eq!(profile.email.as_deref(), Some("owner@acme.test"));

        let store = session.client.store();
        assert!(store.get(CredentialKind::MerchantAccess).is_some());
        assert!(store.get(CredentialKind::MerchantRefresh).is_some());
        assert_eq!(
            store.merchant_profile().unwrap().tenant_id,
            Some(TenantId::new("tnt_a"))
        );
    }

    #[tokio::test]
    async fn test_login_bad_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "statusCode": 401,
                "message": "Invalid credentials"
            })))
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        let err = session
            .login_merchant("owner@acme.test", &SecretString::from("wrong".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::AuthFailed {
                identity: IdentityKind::Merchant,
                ..
            }
        ));
        assert_eq!(err.message(), "Invalid credentials");
        assert!(session.client.store().get(CredentialKind::MerchantAccess).is_none());
    }

    #[tokio::test]
    async fn test_failed_login_keeps_customer_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(Anonymous)
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "statusCode": 401,
                "message": "Invalid credentials"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session_for(&server).await;
        session.establish_customer(
            &SecretString::from("c-1".to_string()),
            &CustomerProfileSnapshot::default(),
        );

        let err = session
            .login_merchant("owner@acme.test", &SecretString::from("wrong".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ApiError::AuthFailed {
                identity: IdentityKind::Merchant,
                ..
            }
        ));
        assert!(session.client.store().get(CredentialKind::CustomerAccess).is_some());
    }

    #[tokio::test]
    async fn test_logout_scopes() {
        let server = MockServer::start().await;
        let session = session_for(&server).await;
        session.establish_merchant(
            &MerchantTokens {
                access_token: SecretString::from("m".to_string()),
                refresh_token: None,
            },
            &UserProfileSnapshot::default(),
        );
        session.establish_customer(
            &SecretString::from("c".to_string()),
            &CustomerProfileSnapshot::default(),
        );

        session.logout_customer();
        let store = session.client.store();
        assert!(store.get(CredentialKind::CustomerAccess).is_none());
        assert!(store.get(CredentialKind::MerchantAccess).is_some());

        session.logout_all();
        assert!(store.get(CredentialKind::MerchantAccess).is_none());
    }
}
