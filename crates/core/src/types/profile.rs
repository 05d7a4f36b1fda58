//! Cached identity profile snapshots.
//!
//! Snapshots are written by the login/refresh flow and read by tenant
//! resolution and identity selection. They are never authoritative: the
//! backend re-validates every request.

use serde::{Deserialize, Serialize};

use crate::types::{CustomerId, MerchantRole, TenantId, UserId};

/// Cached merchant/staff profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfileSnapshot {
    /// Staff user id.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Tenant the staff user belongs to.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    /// Canonical tenant domain, e.g. `acme.shopfront.app`.
    #[serde(default)]
    pub tenant_domain: Option<String>,
    /// Staff role within the tenant.
    #[serde(default)]
    pub role: MerchantRole,
    /// Whether the user must change their password before continuing.
    #[serde(default)]
    pub must_change_password: bool,
    /// Login email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Cached storefront customer profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfileSnapshot {
    /// Customer id within the tenant.
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
    /// Tenant whose storefront the customer signed in on.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    /// Canonical domain of that storefront.
    #[serde(default)]
    pub tenant_domain: Option<String>,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
}

/// Common view over both snapshot kinds, used when comparing a profile's
/// tenant against the request's tenant context.
pub trait TenantBound {
    /// Tenant id recorded in the profile, if any.
    fn tenant_id(&self) -> Option<&TenantId>;
    /// Tenant domain recorded in the profile, if any.
    fn tenant_domain(&self) -> Option<&str>;
}

impl TenantBound for UserProfileSnapshot {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn tenant_domain(&self) -> Option<&str> {
        self.tenant_domain.as_deref()
    }
}

impl TenantBound for CustomerProfileSnapshot {
    fn tenant_id(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn tenant_domain(&self) -> Option<&str> {
        self.tenant_domain.as_deref()
    }
}
