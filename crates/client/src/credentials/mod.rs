//! Credential store.
//!
//! Typed accessors for every persisted credential and session input, layered
//! over two [`StorageTier`]s:
//!
//! - **durable** - survives restarts; preferred for reads
//! - **secondary** - transport-oriented (cookie-like); read when the durable
//!   tier has nothing, e.g. when the session was established on a sibling
//!   subdomain
//!
//! Writes go to every writable tier. The store never fails outward: storage
//! errors are logged and the affected value is treated as absent, leaving the
//! request executor to decide what an anonymous request means.

pub mod tier;

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use shopfront_core::{
    ClearScope, CredentialKind, CustomerProfileSnapshot, Subdomain, TenantId, UserProfileSnapshot,
};

pub use tier::{FileTier, MemoryTier, StorageError, StorageTier};

/// Storage keys for non-credential session data.
pub mod keys {
    /// Cached merchant profile snapshot (JSON).
    pub const MERCHANT_PROFILE: &str = "merchantProfile";

    /// Cached customer profile snapshot (JSON).
    pub const CUSTOMER_PROFILE: &str = "customerProfile";

    /// Guest cart continuation token.
    pub const GUEST_SESSION_ID: &str = "guestSessionId";

    /// Subdomain seen the last time the page host was a tenant subdomain.
    pub const REMEMBERED_SUBDOMAIN: &str = "rememberedTenantSubdomain";

    /// Tenant id paired with the remembered subdomain.
    pub const REMEMBERED_TENANT_ID: &str = "rememberedTenantId";
}

/// A stored bearer credential.
///
/// The token is opaque; [`Credential::expires_at`] peeks at a JWT `exp`
/// claim when one is present, which is only ever used to refresh early.
#[derive(Clone)]
pub struct Credential {
    kind: CredentialKind,
    token: SecretString,
}

impl Credential {
    /// Wrap a token.
    #[must_use]
    pub fn new(kind: CredentialKind, token: impl Into<String>) -> Self {
        Self {
            kind,
            token: SecretString::from(token.into()),
        }
    }

    /// Which credential this is.
    #[must_use]
    pub const fn kind(&self) -> CredentialKind {
        self.kind
    }

    /// The secret token.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.token
    }

    /// Byte-for-byte token comparison.
    #[must_use]
    pub fn same_token(&self, other: &SecretString) -> bool {
        self.token.expose_secret() == other.expose_secret()
    }

    /// Best-effort expiry from a JWT `exp` claim. `None` for opaque tokens.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        peek_jwt_expiry(self.token.expose_secret())
    }

    /// Whether the peeked expiry is at or before `now + skew_secs`.
    ///
    /// Tokens without a readable expiry are never considered expired here.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew_secs: i64) -> bool {
        self.expires_at()
            .is_some_and(|exp| now.timestamp() >= exp.timestamp() - skew_secs)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

fn peek_jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Tenant remembered from the last subdomain visit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberedTenant {
    /// The remembered subdomain label.
    pub subdomain: Subdomain,
    /// Tenant id learned while on that subdomain, if any.
    pub tenant_id: Option<TenantId>,
}

/// Typed access to persisted credentials and session inputs.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<CredentialStoreInner>,
}

struct CredentialStoreInner {
    durable: Box<dyn StorageTier>,
    secondary: Box<dyn StorageTier>,
}

impl CredentialStore {
    /// Create a store over a durable and a secondary tier.
    #[must_use]
    pub fn new(durable: impl StorageTier + 'static, secondary: impl StorageTier + 'static) -> Self {
        Self {
            inner: Arc::new(CredentialStoreInner {
                durable: Box::new(durable),
                secondary: Box::new(secondary),
            }),
        }
    }

    /// Create a store with two in-memory tiers.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryTier::new(), MemoryTier::new())
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Read a credential, preferring the durable tier.
    #[must_use]
    pub fn get(&self, kind: CredentialKind) -> Option<Credential> {
        self.read(kind.storage_key())
            .map(|token| Credential::new(kind, token))
    }

    /// Store a credential in every writable tier.
    pub fn set(&self, kind: CredentialKind, token: &SecretString) {
        self.write(kind.storage_key(), token.expose_secret());
    }

    /// Remove a single credential.
    pub fn remove_credential(&self, kind: CredentialKind) {
        self.remove(kind.storage_key());
    }

    /// Remove credentials (and the matching profile snapshots) for `scope`.
    ///
    /// Partial scopes leave the other identity untouched.
    pub fn clear(&self, scope: ClearScope) {
        debug!(?scope, "Clearing stored credentials");

        for kind in CredentialKind::ALL {
            if scope.covers(kind) {
                self.remove(kind.storage_key());
            }
        }
        if matches!(scope, ClearScope::Merchant | ClearScope::All) {
            self.remove(keys::MERCHANT_PROFILE);
        }
        if matches!(scope, ClearScope::Customer | ClearScope::All) {
            self.remove(keys::CUSTOMER_PROFILE);
        }
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Cached merchant profile, if present and decodable.
    #[must_use]
    pub fn merchant_profile(&self) -> Option<UserProfileSnapshot> {
        self.read_json(keys::MERCHANT_PROFILE)
    }

    /// Cache the merchant profile.
    pub fn set_merchant_profile(&self, profile: &UserProfileSnapshot) {
        self.write_json(keys::MERCHANT_PROFILE, profile);
    }

    /// Cached customer profile, if present and decodable.
    #[must_use]
    pub fn customer_profile(&self) -> Option<CustomerProfileSnapshot> {
        self.read_json(keys::CUSTOMER_PROFILE)
    }

    /// Cache the customer profile.
    pub fn set_customer_profile(&self, profile: &CustomerProfileSnapshot) {
        self.write_json(keys::CUSTOMER_PROFILE, profile);
    }

    // =========================================================================
    // Session inputs
    // =========================================================================

    /// Guest cart continuation token.
    #[must_use]
    pub fn guest_session_id(&self) -> Option<String> {
        self.read(keys::GUEST_SESSION_ID)
    }

    /// Persist a guest cart continuation token.
    pub fn set_guest_session_id(&self, session_id: &str) {
        if self.guest_session_id().as_deref() != Some(session_id) {
            self.write(keys::GUEST_SESSION_ID, session_id);
        }
    }

    /// Subdomain (and tenant id) remembered from the last subdomain visit.
    #[must_use]
    pub fn remembered_tenant(&self) -> Option<RememberedTenant> {
        let raw = self.read(keys::REMEMBERED_SUBDOMAIN)?;
        let subdomain = Subdomain::parse(&raw)
            .inspect_err(|e| warn!(error = %e, "Ignoring invalid remembered subdomain"))
            .ok()?;
        Some(RememberedTenant {
            subdomain,
            tenant_id: self.read(keys::REMEMBERED_TENANT_ID).map(TenantId::from),
        })
    }

    /// Remember the subdomain the page is on.
    ///
    /// A tenant id is only kept when it was learned for this same subdomain;
    /// switching subdomains drops the previous id.
    pub fn remember_tenant(&self, subdomain: &Subdomain, tenant_id: Option<&TenantId>) {
        let previous = self.read(keys::REMEMBERED_SUBDOMAIN);
        if previous.as_deref() != Some(subdomain.as_str()) {
            self.write(keys::REMEMBERED_SUBDOMAIN, subdomain.as_str());
            self.remove(keys::REMEMBERED_TENANT_ID);
        }
        if let Some(id) = tenant_id {
            self.write(keys::REMEMBERED_TENANT_ID, id.as_str());
        }
    }

    // =========================================================================
    // Tier plumbing
    // =========================================================================

    fn tiers(&self) -> [&dyn StorageTier; 2] {
        [self.inner.durable.as_ref(), self.inner.secondary.as_ref()]
    }

    /// The first tier holding the key decides; an empty value is a
    /// tombstone hiding whatever a later tier still holds.
    fn read(&self, key: &str) -> Option<String> {
        self.tiers()
            .into_iter()
            .find_map(|tier| tier.read(key))
            .filter(|v| !v.is_empty())
    }

    fn write(&self, key: &str, value: &str) {
        for tier in self.tiers() {
            if !tier.is_writable() {
                continue;
            }
            if let Err(e) = tier.write(key, value) {
                warn!(tier = tier.name(), key, error = %e, "Failed to write session value");
            }
        }
    }

    fn remove(&self, key: &str) {
        let shadowed = self
            .tiers()
            .into_iter()
            .any(|tier| !tier.is_writable() && tier.read(key).is_some_and(|v| !v.is_empty()));

        for tier in self.tiers() {
            if !tier.is_writable() {
                continue;
            }
            let result = if shadowed {
                tier.write(key, "")
            } else {
                tier.remove(key)
            };
            if let Err(e) = result {
                warn!(tier = tier.name(), key, error = %e, "Failed to remove session value");
            }
        }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(key)?;
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(key, error = %e, "Ignoring undecodable session value"))
            .ok()
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write(key, &raw),
            Err(e) => warn!(key, error = %e, "Failed to encode session value"),
        }
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("durable", &self.inner.durable.name())
            .field("secondary", &self.inner.secondary.name())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn jwt_with_exp(exp: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"u1","exp":{exp}}}"#));
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn test_reads_fall_back_to_secondary_tier() {
        let secondary = MemoryTier::read_only([("customerAccessToken", "from-cookie")]);
        let store = CredentialStore::new(MemoryTier::new(), secondary);

        let credential = store.get(CredentialKind::CustomerAccess).unwrap();
        assert!(credential.same_token(&SecretString::from("from-cookie".to_string())));
    }

    #[test]
    fn test_clear_hides_read_only_secondary_value() {
        let secondary = MemoryTier::read_only([("merchantAccessToken", "from-cookie")]);
        let store = CredentialStore::new(MemoryTier::new(), secondary);
        assert!(store.get(CredentialKind::MerchantAccess).is_some());

        store.clear(ClearScope::Merchant);
        assert!(store.get(CredentialKind::MerchantAccess).is_none());

        store.set(CredentialKind::MerchantAccess, &SecretString::from("fresh".to_string()));
        let credential = store.get(CredentialKind::MerchantAccess).unwrap();
        assert!(credential.same_token(&SecretString::from("fresh".to_string())));
    }

    #[test]
    fn test_durable_tier_wins() {
        let secondary = MemoryTier::read_only([("merchantAccessToken", "stale")]);
        let store = CredentialStore::new(MemoryTier::new(), secondary);

        store.set(CredentialKind::MerchantAccess, &SecretString::from("fresh".to_string()));
        let credential = store.get(CredentialKind::MerchantAccess).unwrap();
        assert!(credential.same_token(&SecretString::from("fresh".to_string())));
    }

    #[test]
    fn test_partial_clear_keeps_other_identity() {
        let store = CredentialStore::in_memory();
        store.set(CredentialKind::MerchantAccess, &SecretString::from("m".to_string()));
        store.set(CredentialKind::MerchantRefresh, &SecretString::from("r".to_string()));
        store.set(CredentialKind::CustomerAccess, &SecretString::from("c".to_string()));
        store.set_merchant_profile(&UserProfileSnapshot::default());
        store.set_customer_profile(&CustomerProfileSnapshot::default());

        store.clear(ClearScope::Merchant);

        assert!(store.get(CredentialKind::MerchantAccess).is_none());
        assert!(store.get(CredentialKind::MerchantRefresh).is_none());
        assert!(store.merchant_profile().is_none());
        assert!(store.get(CredentialKind::CustomerAccess).is_some());
        assert!(store.customer_profile().is_some());
    }

    #[test]
    fn test_clear_all_removes_profiles_but_keeps_guest_session() {
        let store = CredentialStore::in_memory();
        store.set(CredentialKind::CustomerAccess, &SecretString::from("c".to_string()));
        store.set_customer_profile(&CustomerProfileSnapshot::default());
        store.set_guest_session_id("guest-1");

        store.clear(ClearScope::All);

        assert!(store.get(CredentialKind::CustomerAccess).is_none());
        assert!(store.customer_profile().is_none());
        assert_eq!(store.guest_session_id().as_deref(), Some("guest-1"));
    }

    #[test]
    fn test_undecodable_profile_is_absent() {
        let durable = MemoryTier::new();
        durable.write(keys::MERCHANT_PROFILE, "{not json").unwrap();
        let store = CredentialStore::new(durable, MemoryTier::new());

        assert!(store.merchant_profile().is_none());
    }

    #[test]
    fn test_remember_tenant_drops_id_on_subdomain_switch() {
        let store = CredentialStore::in_memory();
        let acme = Subdomain::parse("acme").unwrap();
        let globex = Subdomain::parse("globex").unwrap();

        store.remember_tenant(&acme, Some(&TenantId::new("tnt_a")));
        assert_eq!(
            store.remembered_tenant().unwrap().tenant_id,
            Some(TenantId::new("tnt_a"))
        );

        store.remember_tenant(&globex, None);
        let remembered = store.remembered_tenant().unwrap();
        assert_eq!(remembered.subdomain, globex);
        assert!(remembered.tenant_id.is_none());
    }

    #[test]
    fn test_jwt_expiry_peek() {
        let now = Utc::now().timestamp();
        let expired = Credential::new(CredentialKind::MerchantAccess, jwt_with_exp(now - 10));
        let fresh = Credential::new(CredentialKind::MerchantAccess, jwt_with_exp(now + 3600));
        let opaque = Credential::new(CredentialKind::MerchantAccess, "opaque-token");

        assert!(expired.is_expired_at(Utc::now(), 0));
        assert!(!fresh.is_expired_at(Utc::now(), 30));
        assert!(opaque.expires_at().is_none());
        assert!(!opaque.is_expired_at(Utc::now(), 30));
    }

    #[test]
    fn test_credential_debug_redacts_token() {
        let credential = Credential::new(CredentialKind::CustomerAccess, "super-secret");
        let debug = format!("{credential:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }
}
