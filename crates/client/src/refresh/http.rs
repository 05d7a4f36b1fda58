//! Refresh-token exchange against the identity service.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::RefreshError;
use crate::executor::envelope::{parse_body, unwrap_envelope};

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// New access token.
    pub access_token: SecretString,
    /// Rotated refresh token, when the identity service rotates.
    pub refresh_token: Option<SecretString>,
}

/// Exchanges a refresh token for a new access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform one exchange.
    ///
    /// # Errors
    ///
    /// `RefreshError::Rejected` when the identity service refuses the refresh
    /// token; `Network` or `Malformed` for transport and decoding failures.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedTokens, RefreshError>;
}

/// Request body for the refresh endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Response from the refresh endpoint, after envelope unwrapping.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access_token: String,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
}

/// [`TokenRefresher`] calling `POST {identity}/auth/refresh`.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenRefresher {
    /// Create a refresher posting to `identity_base_url` + `path`.
    #[must_use]
    pub fn new(http: reqwest::Client, identity_base_url: &str, path: &str) -> Self {
        Self {
            http,
            url: format!("{identity_base_url}{path}"),
        }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[instrument(skip(self, refresh_token), fields(url = %self.url))]
    async fn refresh(&self, refresh_token: &SecretString) -> Result<RefreshedTokens, RefreshError> {
        let response = self
            .http
            .post(&self.url)
            .header("X-Requested-With", "XMLHttpRequest")
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(RefreshError::Network(format!(
                "identity service returned HTTP {status}"
            )));
        }

        let payload = unwrap_envelope(parse_body(&text)).map_err(|body| {
            if body.status == 401 || body.status == 400 {
                RefreshError::Rejected {
                    status: body.status,
                }
            } else {
                RefreshError::Malformed(body.to_string())
            }
        })?;
        let parsed: RefreshResponse =
            serde_json::from_value(payload).map_err(|e| RefreshError::Malformed(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(RefreshError::Malformed("empty access token".to_string()));
        }

        Ok(RefreshedTokens {
            access_token: SecretString::from(parsed.access_token),
            refresh_token: parsed
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
        })
    }
}
