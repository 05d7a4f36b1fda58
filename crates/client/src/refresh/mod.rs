//! Single-flight session refresh.
//!
//! Any number of requests may discover at the same moment that the merchant
//! access token has expired. The [`RefreshCoordinator`] guarantees that at
//! most one refresh-token exchange is in flight; every other caller parks a
//! waiter and receives the same outcome when the exchange settles.
//!
//! The exchange itself runs in a spawned task, so a caller that gives up
//! (timeout, dropped future) never cancels the refresh the others wait on.
//!
//! # Clear policy
//!
//! A refresh token rejected by the identity service ends the session, except
//! on protected pages where clearing would throw away unsaved work; there the
//! error is surfaced and credentials stay. A refreshed token that is rejected
//! again ends the session unconditionally.

pub mod http;

pub use http::{HttpTokenRefresher, RefreshedTokens, TokenRefresher};

use std::collections::VecDeque;
use std::sync::Arc;

use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, instrument, warn};

use shopfront_core::{ClearScope, CredentialKind};

use crate::clock::Clock;
use crate::credentials::CredentialStore;
use crate::page::{CurrentPage, PagePolicy};

/// Seconds before the peeked expiry at which a token counts as expired.
pub const PROACTIVE_REFRESH_SKEW_SECS: i64 = 30;

/// Errors from a refresh attempt. Cloned to every waiter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// No refresh token is stored.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The identity service refused the refresh token.
    #[error("Refresh token rejected (HTTP {status})")]
    Rejected {
        /// Status returned by the identity service.
        status: u16,
    },

    /// The identity service could not be reached or failed.
    #[error("Refresh failed: {0}")]
    Network(String),

    /// The identity service answered with an unusable body.
    #[error("Malformed refresh response: {0}")]
    Malformed(String),
}

/// Outcome handed to a refresh caller.
#[derive(Clone)]
pub struct RefreshedToken {
    /// Access token to retry with.
    pub token: SecretString,
    /// The identity service returned the token that was already stored.
    ///
    /// If a retry with it is rejected again, the session cannot recover.
    pub unchanged: bool,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("token", &"[REDACTED]")
            .field("unchanged", &self.unchanged)
            .finish()
    }
}

type RefreshOutcome = Result<RefreshedToken, RefreshError>;

/// A caller parked until the in-flight refresh settles.
struct RefreshWaiter(oneshot::Sender<RefreshOutcome>);

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<RefreshWaiter>,
}

/// Serialises merchant session refreshes.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    store: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    page: CurrentPage,
    pages: PagePolicy,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        store: CredentialStore,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        page: CurrentPage,
        pages: PagePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                refresher,
                clock,
                page,
                pages,
                state: Mutex::new(RefreshState::default()),
            }),
        }
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Obtain a fresh merchant access token, joining any refresh in flight.
    ///
    /// `rejected` is the token that was just refused. If the store already
    /// holds a different token, another refresh has rotated it in the
    /// meantime and that token is returned without a network call.
    ///
    /// # Errors
    ///
    /// `RefreshError::NoRefreshToken` when no refresh can be attempted,
    /// otherwise the error of the shared exchange.
    #[instrument(skip_all)]
    pub async fn refresh(&self, rejected: Option<&SecretString>) -> RefreshOutcome {
        let receiver = {
            let mut state = self.inner.state.lock().await;

            if !state.refreshing {
                if let Some(rejected) = rejected
                    && let Some(current) = self.inner.store.get(CredentialKind::MerchantAccess)
                    && !current.same_token(rejected)
                {
                    debug!("Access token already rotated, skipping refresh");
                    return Ok(RefreshedToken {
                        token: current.secret().clone(),
                        unchanged: false,
                    });
                }

                let Some(refresh_token) = self.inner.store.get(CredentialKind::MerchantRefresh)
                else {
                    debug!("No refresh token stored");
                    return Err(RefreshError::NoRefreshToken);
                };

                state.refreshing = true;
                let inner = Arc::clone(&self.inner);
                let refresh_token = refresh_token.secret().clone();
                tokio::spawn(async move { inner.run(refresh_token).await });
            } else {
                debug!(waiting = state.waiters.len(), "Joining in-flight refresh");
            }

            let (sender, receiver) = oneshot::channel();
            state.waiters.push_back(RefreshWaiter(sender));
            receiver
        };

        receiver.await.unwrap_or_else(|_| {
            Err(RefreshError::Network(
                "refresh ended without a result".to_string(),
            ))
        })
    }

    /// Whether the stored merchant access token should be refreshed before
    /// use: its peeked expiry has passed (with skew) and a refresh token
    /// exists.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        let store = &self.inner.store;
        store.get(CredentialKind::MerchantRefresh).is_some()
            && store
                .get(CredentialKind::MerchantAccess)
                .is_some_and(|c| c.is_expired_at(self.inner.clock.now(), PROACTIVE_REFRESH_SKEW_SECS))
    }

    /// Whether a refresh is currently in flight.
    pub async fn is_refreshing(&self) -> bool {
        self.inner.state.lock().await.refreshing
    }

    // =========================================================================
    // Clear policy
    // =========================================================================

    /// Clear `scope` unless the user is on a protected page.
    ///
    /// Returns whether anything was cleared.
    pub async fn expire_session(&self, scope: ClearScope) -> bool {
        self.inner.clear_unless_protected(scope).await
    }

    /// Clear every credential regardless of the current page.
    ///
    /// Used when a freshly refreshed token is rejected again: keeping it
    /// would only repeat the failure on every request.
    pub fn abandon_session(&self) {
        error!("Refreshed credential rejected again, clearing session");
        self.inner.store.clear(ClearScope::All);
    }
}

impl CoordinatorInner {
    async fn run(self: Arc<Self>, refresh_token: SecretString) {
        let previous = self.store.get(CredentialKind::MerchantAccess);

        let refresher = Arc::clone(&self.refresher);
        let exchange = tokio::spawn(async move { refresher.refresh(&refresh_token).await });
        let result = exchange
            .await
            .unwrap_or_else(|e| Err(RefreshError::Network(format!("refresh task failed: {e}"))));

        let outcome = match result {
            Ok(tokens) => {
                let unchanged = previous
                    .as_ref()
                    .is_some_and(|p| p.same_token(&tokens.access_token));
                self.store
                    .set(CredentialKind::MerchantAccess, &tokens.access_token);
                if let Some(rotated) = &tokens.refresh_token {
                    self.store.set(CredentialKind::MerchantRefresh, rotated);
                }
                if unchanged {
                    warn!("Identity service returned the current access token");
                } else {
                    info!(rotated = tokens.refresh_token.is_some(), "Merchant session refreshed");
                }
                Ok(RefreshedToken {
                    token: tokens.access_token,
                    unchanged,
                })
            }
            Err(e) => {
                warn!(error = %e, "Merchant session refresh failed");
                if matches!(e, RefreshError::Rejected { .. }) {
                    self.clear_unless_protected(ClearScope::All).await;
                }
                Err(e)
            }
        };

        let waiters = {
            let mut state = self.state.lock().await;
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), "Resolving refresh waiters");
        for RefreshWaiter(sender) in waiters {
            // A dropped receiver means that caller gave up.
            let _ = sender.send(outcome.clone());
        }
    }

    async fn clear_unless_protected(&self, scope: ClearScope) -> bool {
        let page = self.page.snapshot().await;
        if self.pages.is_protected(page.path()) {
            warn!(
                path = %page.path(),
                ?scope,
                "Keeping credentials on protected page despite auth failure"
            );
            return false;
        }
        self.store.clear(scope);
        true
    }
}
