//! Per-request tenant context.

use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Where a request's tenant domain was derived from.
///
/// Variants are listed from highest to lowest resolution priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TenantSource {
    /// A tenant query parameter on the current page.
    UrlParam,
    /// The page host is itself a tenant subdomain.
    Subdomain,
    /// A subdomain remembered from an earlier subdomain visit.
    StoredSubdomain,
    /// The cached merchant profile.
    UserProfile,
    /// The cached customer profile.
    CustomerProfile,
    /// The literal page host.
    Host,
}

impl TenantSource {
    /// Whether the tenant is explicit from the page's own address.
    ///
    /// Explicit contexts take precedence over any stored identity: a profile
    /// bound to another tenant must never be attached to such a request.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::UrlParam | Self::Subdomain)
    }
}

impl std::fmt::Display for TenantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UrlParam => "url-param",
            Self::Subdomain => "subdomain",
            Self::StoredSubdomain => "stored-subdomain",
            Self::UserProfile => "user-profile",
            Self::CustomerProfile => "customer-profile",
            Self::Host => "host",
        };
        f.write_str(s)
    }
}

/// The tenant a single request belongs to.
///
/// Computed fresh for every request; only its inputs are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    /// Human-readable tenant domain sent as `X-Tenant-Domain`.
    pub domain: String,
    /// Tenant id sent as `X-Tenant-Id`, when independently known.
    pub tenant_id: Option<TenantId>,
    /// Which rule produced `domain`.
    pub source: TenantSource,
}

impl TenantContext {
    /// Create a context with no tenant id.
    #[must_use]
    pub fn new(domain: impl Into<String>, source: TenantSource) -> Self {
        Self {
            domain: domain.into(),
            tenant_id: None,
            source,
        }
    }

    /// Attach a tenant id.
    #[must_use]
    pub fn with_tenant_id(mut self, tenant_id: Option<TenantId>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Whether this context came from the page's own address.
    #[must_use]
    pub const fn is_explicit(&self) -> bool {
        self.source.is_explicit()
    }
}
