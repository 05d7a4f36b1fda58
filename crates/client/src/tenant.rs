//! Tenant resolution.
//!
//! Derives the tenant a request belongs to from the current page and the
//! persisted session inputs. Resolution order, highest priority first:
//!
//! 1. A tenant query parameter on the page (embedded previews)
//! 2. The page host being a tenant subdomain, in production or development
//!    form; the subdomain is remembered for later neutral-host visits
//! 3. On a neutral host only: the remembered subdomain, then the merchant
//!    profile's tenant, then the customer profile's tenant
//! 4. The literal page host
//!
//! Rules 1 and 2 are *explicit*. For explicit contexts the tenant id is only
//! taken from sources that agree with the explicit domain, never from a
//! profile that may belong to another store used on the same device.

use std::net::IpAddr;

use tracing::debug;

use shopfront_core::{
    Subdomain, TenantBound, TenantContext, TenantId, TenantSource,
};

use crate::config::TenancyConfig;
use crate::credentials::CredentialStore;
use crate::page::PageLocation;

/// How a page host relates to the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostClass {
    /// `{sub}.{platform}` or `{sub}.{dev-root}`.
    Tenant(Subdomain),
    /// Platform root, reserved label, loopback or bare IP.
    Neutral,
    /// Anything else, typically a tenant's custom domain.
    Custom,
}

/// Computes a [`TenantContext`] for each request.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    config: TenancyConfig,
}

impl TenantResolver {
    /// Create a resolver for the given platform configuration.
    #[must_use]
    pub const fn new(config: TenancyConfig) -> Self {
        Self { config }
    }

    /// The platform configuration in use.
    #[must_use]
    pub const fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// Resolve the tenant for a request issued from `page`.
    ///
    /// Never fails; the literal host is the last resort.
    pub fn resolve(&self, page: &PageLocation, store: &CredentialStore) -> TenantContext {
        if let Some(domain) = self.domain_from_query(page) {
            let tenant_id = self.consistent_tenant_id(&domain, page, store);
            return TenantContext::new(domain, TenantSource::UrlParam).with_tenant_id(tenant_id);
        }

        match self.classify_host(page.host()) {
            HostClass::Tenant(subdomain) => {
                let domain = subdomain.canonical_domain(&self.config.platform_domain);
                let tenant_id = self.consistent_tenant_id(&domain, page, store);
                store.remember_tenant(&subdomain, tenant_id.as_ref());
                TenantContext::new(domain, TenantSource::Subdomain).with_tenant_id(tenant_id)
            }
            HostClass::Neutral => self.resolve_neutral(page, store),
            HostClass::Custom => host_context(page, store),
        }
    }

    /// Classify a page host name (without port).
    #[must_use]
    pub fn classify_host(&self, host: &str) -> HostClass {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return HostClass::Neutral;
        }

        let roots = std::iter::once(&self.config.platform_domain).chain(&self.config.dev_domains);
        for root in roots {
            if host == *root {
                return HostClass::Neutral;
            }
            let Some(label) = host.strip_suffix(root.as_str()).and_then(|h| h.strip_suffix('.'))
            else {
                continue;
            };
            if label.contains('.') {
                return HostClass::Custom;
            }
            if self.is_reserved(label) {
                return HostClass::Neutral;
            }
            return match Subdomain::parse(label) {
                Ok(subdomain) => HostClass::Tenant(subdomain),
                Err(e) => {
                    debug!(host = %host, error = %e, "Host label is not a valid subdomain");
                    HostClass::Custom
                }
            };
        }

        HostClass::Custom
    }

    fn is_reserved(&self, label: &str) -> bool {
        self.config
            .reserved_subdomains
            .iter()
            .any(|r| r.eq_ignore_ascii_case(label))
    }

    /// Rule 1: explicit tenant query parameter.
    fn domain_from_query(&self, page: &PageLocation) -> Option<String> {
        self.config
            .tenant_query_params
            .iter()
            .filter_map(|param| page.query_param(param))
            .find_map(|value| self.canonicalize(value))
    }

    /// Turn a query value into a canonical tenant domain.
    ///
    /// Bare labels become `{label}.{platform}`; dotted values are taken as
    /// domains, with development roots rewritten to the platform root.
    fn canonicalize(&self, value: &str) -> Option<String> {
        let value = value.trim().to_ascii_lowercase();
        if value.contains('.') {
            return Some(match self.classify_host(&value) {
                HostClass::Tenant(sub) => sub.canonical_domain(&self.config.platform_domain),
                HostClass::Neutral | HostClass::Custom => value,
            });
        }
        match Subdomain::parse(&value) {
            Ok(sub) if !self.is_reserved(sub.as_str()) => {
                Some(sub.canonical_domain(&self.config.platform_domain))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(value = %value, error = %e, "Ignoring invalid tenant query parameter");
                None
            }
        }
    }

    /// Rule 3: neutral host fallbacks.
    fn resolve_neutral(&self, page: &PageLocation, store: &CredentialStore) -> TenantContext {
        if let Some(remembered) = store.remembered_tenant() {
            return TenantContext::new(
                remembered
                    .subdomain
                    .canonical_domain(&self.config.platform_domain),
                TenantSource::StoredSubdomain,
            )
            .with_tenant_id(remembered.tenant_id);
        }

        if let Some(profile) = store.merchant_profile()
            && let Some(domain) = profile.tenant_domain.clone()
        {
            return TenantContext::new(domain, TenantSource::UserProfile)
                .with_tenant_id(profile.tenant_id);
        }

        if let Some(profile) = store.customer_profile()
            && let Some(domain) = profile.tenant_domain.clone()
        {
            return TenantContext::new(domain, TenantSource::CustomerProfile)
                .with_tenant_id(profile.tenant_id);
        }

        host_context(page, store)
    }

    /// Tenant id for an explicit domain, from sources that agree with it.
    fn consistent_tenant_id(
        &self,
        domain: &str,
        page: &PageLocation,
        store: &CredentialStore,
    ) -> Option<TenantId> {
        if let Some(id) = page.query_param(&self.config.tenant_id_query_param) {
            return Some(TenantId::new(id));
        }

        if let Some(id) = store
            .merchant_profile()
            .and_then(|p| bound_id_for(&p, domain))
        {
            return Some(id);
        }

        if let Some(id) = store
            .customer_profile()
            .and_then(|p| bound_id_for(&p, domain))
        {
            return Some(id);
        }

        store.remembered_tenant().and_then(|remembered| {
            let remembered_domain = remembered
                .subdomain
                .canonical_domain(&self.config.platform_domain);
            remembered_domain
                .eq_ignore_ascii_case(domain)
                .then_some(remembered.tenant_id)
                .flatten()
        })
    }
}

/// Rule 4: the literal host, with any independently known tenant id.
fn host_context(page: &PageLocation, store: &CredentialStore) -> TenantContext {
    let tenant_id = store
        .merchant_profile()
        .and_then(|p| p.tenant_id)
        .or_else(|| store.customer_profile().and_then(|p| p.tenant_id));
    TenantContext::new(page.host(), TenantSource::Host).with_tenant_id(tenant_id)
}

/// The profile's tenant id, if the profile is bound to `domain`.
fn bound_id_for(profile: &impl TenantBound, domain: &str) -> Option<TenantId> {
    let profile_domain = profile.tenant_domain()?;
    if profile_domain.eq_ignore_ascii_case(domain) {
        profile.tenant_id().cloned()
    } else {
        None
    }
}
