//! Current page location and page-class predicates.
//!
//! The client is embedded in an application that has a notion of "the page
//! the user is on": tenant resolution reads its host and query, and the
//! safe-redirect policy reads its path. [`CurrentPage`] is the shared handle
//! the host application updates on navigation.

use std::sync::Arc;

use tokio::sync::RwLock;
use url::Url;

/// Snapshot of the page the user is currently on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    host: String,
    port: Option<u16>,
    path: String,
    query: Vec<(String, String)>,
}

impl PageLocation {
    /// Parse a page URL such as `https://acme.shopfront.app/dashboard?tab=1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(url)?;
        Ok(Self::from_url(&parsed))
    }

    /// Build a location from an already parsed URL.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self {
            host: url.host_str().unwrap_or_default().to_ascii_lowercase(),
            port: url.port(),
            path: url.path().to_string(),
            query: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        }
    }

    /// Host name without port, lowercase.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if the URL carried one.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// Path component, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First non-empty value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, v)| k == name && !v.trim().is_empty())
            .map(|(_, v)| v.trim())
    }

    /// Return a copy of this location pointing at a different path on the
    /// same host, with no query.
    #[must_use]
    pub fn with_path(&self, path: &str) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            path: path.to_string(),
            query: Vec::new(),
        }
    }
}

impl Default for PageLocation {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            path: "/".to_string(),
            query: Vec::new(),
        }
    }
}

/// Which pages get special treatment by the redirect and clear policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePolicy {
    /// Pages where losing the session would destroy unsaved work.
    pub protected_prefixes: Vec<String>,
    /// Login/registration pages; never redirected to login again.
    pub auth_prefixes: Vec<String>,
    /// Where merchant sessions are sent when they cannot be recovered.
    pub merchant_login_path: String,
    /// Where customer sessions are sent when they expire.
    pub customer_login_path: String,
}

impl Default for PagePolicy {
    fn default() -> Self {
        Self {
            protected_prefixes: vec!["/dashboard".to_string(), "/setup".to_string()],
            auth_prefixes: vec![
                "/login".to_string(),
                "/register".to_string(),
                "/auth".to_string(),
                "/forgot-password".to_string(),
                "/reset-password".to_string(),
                "/account/login".to_string(),
            ],
            merchant_login_path: "/login".to_string(),
            customer_login_path: "/account/login".to_string(),
        }
    }
}

impl PagePolicy {
    /// Whether `path` is a protected (dashboard/setup) page.
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes
            .iter()
            .any(|prefix| has_path_prefix(path, prefix))
    }

    /// Whether `path` is a login/registration page.
    #[must_use]
    pub fn is_auth_page(&self, path: &str) -> bool {
        self.auth_prefixes
            .iter()
            .any(|prefix| has_path_prefix(path, prefix))
    }
}

/// Segment-aware prefix match: `/dashboard` matches `/dashboard` and
/// `/dashboard/orders` but not `/dashboards`.
pub(crate) fn has_path_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Shared, updatable handle to the current page.
#[derive(Debug, Clone, Default)]
pub struct CurrentPage {
    inner: Arc<RwLock<PageLocation>>,
}

impl CurrentPage {
    /// Create a handle starting at `location`.
    #[must_use]
    pub fn new(location: PageLocation) -> Self {
        Self {
            inner: Arc::new(RwLock::new(location)),
        }
    }

    /// Copy of the current location.
    pub async fn snapshot(&self) -> PageLocation {
        self.inner.read().await.clone()
    }

    /// Record a navigation.
    pub async fn set(&self, location: PageLocation) {
        *self.inner.write().await = location;
    }

    /// Move to another path on the same host without awaiting.
    ///
    /// Skipped (and logged) if the location is being written concurrently.
    pub fn navigate(&self, path: &str) {
        match self.inner.try_write() {
            Ok(mut location) => *location = location.with_path(path),
            Err(_) => tracing::debug!(path, "Page busy, navigation not recorded"),
        }
    }
}
