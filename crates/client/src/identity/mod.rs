//! Per-request identity selection.
//!
//! A session can hold a merchant and a customer identity at the same time.
//! The selector picks at most one of them for each request, based on the
//! endpoint's scope and on whether the identity belongs to the tenant the
//! request is for.

pub mod routes;

pub use routes::{EndpointScope, RoutePattern, RouteTable};

use secrecy::SecretString;
use tracing::{debug, warn};

use shopfront_core::{CredentialKind, IdentityKind, TenantBound, TenantContext};

use crate::credentials::CredentialStore;
use crate::page::{PageLocation, PagePolicy};

/// The identity chosen for one request.
#[derive(Clone)]
pub struct Selection {
    /// Endpoint classification.
    pub scope: EndpointScope,
    /// Identity the token belongs to; `None` for anonymous requests.
    pub identity: Option<IdentityKind>,
    /// Bearer token to attach.
    pub token: Option<SecretString>,
}

impl Selection {
    /// No credential attached.
    #[must_use]
    pub const fn anonymous(scope: EndpointScope) -> Self {
        Self {
            scope,
            identity: None,
            token: None,
        }
    }

    fn stored(scope: EndpointScope, kind: CredentialKind, token: SecretString) -> Self {
        Self {
            scope,
            identity: Some(kind.identity()),
            token: Some(token),
        }
    }

    /// Whether a bearer token is attached.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

impl std::fmt::Debug for Selection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selection")
            .field("scope", &self.scope)
            .field("identity", &self.identity)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Chooses which stored identity, if any, authenticates a request.
#[derive(Debug, Clone)]
pub struct IdentitySelector {
    routes: RouteTable,
    pages: PagePolicy,
}

impl IdentitySelector {
    /// Create a selector.
    #[must_use]
    pub const fn new(routes: RouteTable, pages: PagePolicy) -> Self {
        Self { routes, pages }
    }

    /// The routing table in use.
    #[must_use]
    pub const fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Select the identity for a request to `path`.
    ///
    /// An `explicit` caller credential is always used verbatim.
    pub fn select(
        &self,
        path: &str,
        explicit: Option<&SecretString>,
        tenant: &TenantContext,
        page: &PageLocation,
        store: &CredentialStore,
    ) -> Selection {
        let scope = self.routes.classify(path);

        if let Some(token) = explicit {
            return Selection {
                scope,
                identity: Some(IdentityKind::Explicit),
                token: Some(token.clone()),
            };
        }

        let protected = self.pages.is_protected(page.path());
        let merchant = stored_token(store, CredentialKind::MerchantAccess)
            .filter(|_| !self.has_merchant_conflict(tenant, page, store));
        let customer = stored_token(store, CredentialKind::CustomerAccess)
            .filter(|_| !has_customer_conflict(tenant, store));

        let effective = match scope {
            EndpointScope::Unclassified => {
                let fallback = if protected {
                    EndpointScope::MerchantScoped
                } else {
                    EndpointScope::CustomerScoped
                };
                warn!(path = %path, fallback = ?fallback, "Unclassified endpoint");
                fallback
            }
            other => other,
        };

        let chosen = match effective {
            EndpointScope::MerchantScoped => merchant.map(|t| (CredentialKind::MerchantAccess, t)),
            EndpointScope::CustomerScoped
            | EndpointScope::DualEligible
            | EndpointScope::Unclassified => customer
                .map(|t| (CredentialKind::CustomerAccess, t))
                .or_else(|| merchant.map(|t| (CredentialKind::MerchantAccess, t))),
        };

        match chosen {
            Some((kind, token)) => Selection::stored(scope, kind, token),
            None => {
                debug!(path = %path, scope = ?scope, "No identity selected");
                Selection::anonymous(scope)
            }
        }
    }

    /// Whether the stored merchant identity belongs to a different tenant
    /// than an explicit tenant context.
    ///
    /// Protected pages are exempt: the dashboard is the merchant's own.
    #[must_use]
    pub fn has_merchant_conflict(
        &self,
        tenant: &TenantContext,
        page: &PageLocation,
        store: &CredentialStore,
    ) -> bool {
        if !tenant.is_explicit() || self.pages.is_protected(page.path()) {
            return false;
        }
        store
            .merchant_profile()
            .is_some_and(|profile| belongs_elsewhere(&profile, tenant))
    }
}

fn stored_token(store: &CredentialStore, kind: CredentialKind) -> Option<SecretString> {
    store.get(kind).map(|c| c.secret().clone())
}

/// Whether the stored customer identity belongs to a different tenant than
/// an explicit tenant context.
#[must_use]
pub fn has_customer_conflict(tenant: &TenantContext, store: &CredentialStore) -> bool {
    tenant.is_explicit()
        && store
            .customer_profile()
            .is_some_and(|profile| belongs_elsewhere(&profile, tenant))
}

/// Whether a profile is bound to a tenant other than `tenant`.
///
/// Tenant ids are compared when both sides know one; otherwise domains. A
/// profile bound to a tenant id that cannot be matched against the context
/// is foreign. A profile with no tenant information is not.
fn belongs_elsewhere(profile: &impl TenantBound, tenant: &TenantContext) -> bool {
    if let (Some(profile_id), Some(tenant_id)) = (profile.tenant_id(), tenant.tenant_id.as_ref()) {
        return profile_id != tenant_id;
    }
    match profile.tenant_domain() {
        Some(domain) => !domain.eq_ignore_ascii_case(&tenant.domain),
        None => profile.tenant_id().is_some(),
    }
}
