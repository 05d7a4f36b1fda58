//! User-facing error presentation.
//!
//! The presenter is a side channel: it decides whether an [`ApiError`]
//! deserves a notification or a redirect and drives the host application's
//! collaborators, but callers always receive the error as well.
//!
//! Rules:
//!
//! - Suppressed requests and 404s on endpoints that did not require auth are
//!   silent
//! - Auth failures on protected pages never redirect; the user keeps the page
//!   and its unsaved state
//! - Auth failures on login/registration pages never redirect to login again
//! - Server errors and unrecoverable session loops are reported to Sentry

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use shopfront_core::IdentityKind;

use crate::error::ApiError;
use crate::page::{CurrentPage, PageLocation, PagePolicy};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Resolves message keys to display text.
pub trait Translator: Send + Sync {
    /// Translate `key`. Unknown keys should return the key itself.
    fn translate(&self, key: &str) -> String;
}

/// Shows notifications (toasts) to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NotifyLevel, title: &str, description: &str);
}

/// Moves the user to another page.
pub trait Navigator: Send + Sync {
    fn redirect_to(&self, path: &str);
}

/// A notification to show, before translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotifyLevel,
    pub title_key: &'static str,
    pub description_key: &'static str,
    /// Backend message shown instead of the translated description.
    pub detail: Option<String>,
}

/// What the presenter will do for one error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Disposition {
    pub notify: Option<Notification>,
    pub redirect: Option<String>,
}

impl Disposition {
    /// Neither notify nor redirect.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Whether nothing user-visible happens.
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        self.notify.is_none() && self.redirect.is_none()
    }
}

/// Request facts the presenter needs.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    /// Endpoint path that failed.
    pub path: &'a str,
    /// Page the user was on.
    pub page: &'a PageLocation,
    /// Whether the request required authentication.
    pub auth_required: bool,
    /// Caller asked for no user-visible handling.
    pub suppress: bool,
    /// Identity the failing request used.
    pub identity: Option<IdentityKind>,
}

/// Maps errors to notifications and redirects.
#[derive(Clone)]
pub struct ErrorPresenter {
    translator: Arc<dyn Translator>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    pages: PagePolicy,
}

impl ErrorPresenter {
    /// Create a presenter.
    #[must_use]
    pub fn new(
        translator: Arc<dyn Translator>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        pages: PagePolicy,
    ) -> Self {
        Self {
            translator,
            notifier,
            navigator,
            pages,
        }
    }

    /// Record, decide and act on an error. Returns the decision taken.
    pub fn present(&self, error: &ApiError, ctx: &ErrorContext<'_>) -> Disposition {
        record_in_sentry(error, ctx);

        let disposition = disposition(&self.pages, error, ctx);
        if disposition.is_silent() {
            debug!(path = %ctx.path, status = error.status(), "Error not presented");
            return disposition;
        }

        if let Some(notification) = &disposition.notify {
            let title = self.translator.translate(notification.title_key);
            let description = notification
                .detail
                .clone()
                .unwrap_or_else(|| self.translator.translate(notification.description_key));
            self.notifier
                .notify(notification.level, &title, &description);
        }
        if let Some(target) = &disposition.redirect {
            self.navigator.redirect_to(target);
        }
        disposition
    }
}

impl std::fmt::Debug for ErrorPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorPresenter")
            .field("pages", &self.pages)
            .finish_non_exhaustive()
    }
}

/// Decide how an error is presented. Pure; performs no side effects.
#[must_use]
pub fn disposition(pages: &PagePolicy, error: &ApiError, ctx: &ErrorContext<'_>) -> Disposition {
    if ctx.suppress {
        return Disposition::silent();
    }

    let note = |level: NotifyLevel, title_key: &'static str, description_key: &'static str| Notification {
        level,
        title_key,
        description_key,
        detail: None,
    };
    let with_detail = |level: NotifyLevel, title_key: &'static str, description_key: &'static str| {
        Notification {
            level,
            title_key,
            description_key,
            detail: error.body().and_then(|b| b.message.as_ref()).map(ToString::to_string),
        }
    };

    match error {
        ApiError::NotFound(_) if !ctx.auth_required => Disposition::silent(),
        ApiError::NotFound(_) => notify_only(with_detail(
            NotifyLevel::Warning,
            "errors.not_found.title",
            "errors.not_found.description",
        )),
        ApiError::Network(_) => notify_only(note(
            NotifyLevel::Error,
            "errors.network.title",
            "errors.network.description",
        )),
        ApiError::Timeout(_) => notify_only(note(
            NotifyLevel::Warning,
            "errors.timeout.title",
            "errors.timeout.description",
        )),
        ApiError::Forbidden(_) => notify_only(with_detail(
            NotifyLevel::Error,
            "errors.forbidden.title",
            "errors.forbidden.description",
        )),
        ApiError::Validation(_) => notify_only(with_detail(
            NotifyLevel::Warning,
            "errors.validation.title",
            "errors.validation.description",
        )),
        ApiError::RateLimited { .. } => notify_only(note(
            NotifyLevel::Warning,
            "errors.rate_limited.title",
            "errors.rate_limited.description",
        )),
        ApiError::Server(_) => notify_only(note(
            NotifyLevel::Error,
            "errors.server.title",
            "errors.server.description",
        )),
        ApiError::Decode { .. } => notify_only(note(
            NotifyLevel::Error,
            "errors.unexpected.title",
            "errors.unexpected.description",
        )),
        ApiError::AuthRequired(_)
        | ApiError::AuthExpired { .. }
        | ApiError::AuthFailed { .. }
        | ApiError::SessionInvalidLoop => auth_disposition(pages, error, ctx),
    }
}

fn notify_only(notification: Notification) -> Disposition {
    Disposition {
        notify: Some(notification),
        redirect: None,
    }
}

fn auth_disposition(pages: &PagePolicy, error: &ApiError, ctx: &ErrorContext<'_>) -> Disposition {
    let path = ctx.page.path();
    let on_auth_page = pages.is_auth_page(path);

    // Credentials are already gone; the protected-page exception does not apply.
    if matches!(error, ApiError::SessionInvalidLoop) {
        return Disposition {
            notify: Some(Notification {
                level: NotifyLevel::Error,
                title_key: "errors.session_invalid.title",
                description_key: "errors.session_invalid.description",
                detail: None,
            }),
            redirect: (!on_auth_page).then(|| login_target(&pages.merchant_login_path, path)),
        };
    }

    if ctx.identity == Some(IdentityKind::Customer) {
        return Disposition {
            notify: Some(Notification {
                level: NotifyLevel::Info,
                title_key: "errors.customer_session.title",
                description_key: "errors.customer_session.description",
                detail: None,
            }),
            redirect: (!on_auth_page).then(|| login_target(&pages.customer_login_path, path)),
        };
    }

    if ctx.identity == Some(IdentityKind::Explicit) {
        return notify_only(Notification {
            level: NotifyLevel::Error,
            title_key: "errors.unauthorized.title",
            description_key: "errors.unauthorized.description",
            detail: None,
        });
    }

    if pages.is_protected(path) {
        return notify_only(Notification {
            level: NotifyLevel::Error,
            title_key: "errors.session_protected.title",
            description_key: "errors.session_protected.description",
            detail: None,
        });
    }

    let (title_key, description_key) = if matches!(error, ApiError::AuthRequired(_)) {
        ("errors.login_required.title", "errors.login_required.description")
    } else {
        ("errors.session_expired.title", "errors.session_expired.description")
    };
    Disposition {
        notify: Some(Notification {
            level: NotifyLevel::Warning,
            title_key,
            description_key,
            detail: None,
        }),
        redirect: (!on_auth_page).then(|| login_target(&pages.merchant_login_path, path)),
    }
}

/// Login path carrying the page to come back to.
fn login_target(login_path: &str, return_to: &str) -> String {
    if return_to.is_empty() || return_to == "/" {
        return login_path.to_string();
    }
    let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
    format!("{login_path}?redirect={encoded}")
}

// =============================================================================
// Sentry
// =============================================================================

fn record_in_sentry(error: &ApiError, ctx: &ErrorContext<'_>) {
    let status = error.status().to_string();
    let identity = ctx
        .identity
        .map_or_else(|| "anonymous".to_string(), |i| i.to_string());
    add_breadcrumb(
        "http",
        &error.to_string(),
        &[
            ("path", ctx.path),
            ("status", &status),
            ("identity", &identity),
            ("page", ctx.page.path()),
        ],
    );

    if matches!(error, ApiError::Server(_) | ApiError::SessionInvalidLoop) {
        let event_id = sentry::capture_error(error);
        warn!(
            error = %error,
            path = %ctx.path,
            sentry_event_id = %event_id,
            "Request error"
        );
    }
}

/// Add a breadcrumb to the current Sentry scope.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };
    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }
    sentry::add_breadcrumb(breadcrumb);
}

// =============================================================================
// Default collaborators
// =============================================================================

/// English messages for every key the presenter emits.
#[derive(Debug, Clone)]
pub struct DefaultTranslator {
    messages: HashMap<&'static str, &'static str>,
}

impl Default for DefaultTranslator {
    fn default() -> Self {
        let messages = HashMap::from([
            ("errors.network.title", "Connection problem"),
            ("errors.network.description", "We couldn't reach the server. Check your connection and try again."),
            ("errors.timeout.title", "Request timed out"),
            ("errors.timeout.description", "The server took too long to respond."),
            ("errors.not_found.title", "Not found"),
            ("errors.not_found.description", "The requested item does not exist."),
            ("errors.forbidden.title", "Access denied"),
            ("errors.forbidden.description", "You don't have permission to do that."),
            ("errors.validation.title", "Please check your input"),
            ("errors.validation.description", "Some fields are invalid."),
            ("errors.rate_limited.title", "Slow down"),
            ("errors.rate_limited.description", "Too many requests. Please wait a moment."),
            ("errors.server.title", "Something went wrong"),
            ("errors.server.description", "The server encountered an error. Please try again later."),
            ("errors.unexpected.title", "Unexpected response"),
            ("errors.unexpected.description", "The server sent a response we couldn't read."),
            ("errors.unauthorized.title", "Not authorized"),
            ("errors.unauthorized.description", "The supplied credential was rejected."),
            ("errors.login_required.title", "Sign in required"),
            ("errors.login_required.description", "Please sign in to continue."),
            ("errors.session_expired.title", "Session expired"),
            ("errors.session_expired.description", "Please sign in again."),
            ("errors.session_protected.title", "Session problem"),
            ("errors.session_protected.description", "Your session could not be renewed. Save your work and sign in again."),
            ("errors.session_invalid.title", "Signed out"),
            ("errors.session_invalid.description", "Your session is no longer valid. Please sign in again."),
            ("errors.customer_session.title", "Signed out"),
            ("errors.customer_session.description", "Please sign in to your account again."),
        ]);
        Self { messages }
    }
}

impl Translator for DefaultTranslator {
    fn translate(&self, key: &str) -> String {
        self.messages
            .get(key)
            .map_or_else(|| key.to_string(), |m| (*m).to_string())
    }
}

/// Navigator that records redirects on a [`CurrentPage`].
#[derive(Debug, Clone)]
pub struct PageNavigator {
    page: CurrentPage,
}

impl PageNavigator {
    #[must_use]
    pub const fn new(page: CurrentPage) -> Self {
        Self { page }
    }
}

impl Navigator for PageNavigator {
    fn redirect_to(&self, path: &str) {
        self.page.navigate(path);
    }
}
