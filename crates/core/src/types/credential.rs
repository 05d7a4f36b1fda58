//! Credential and identity kinds.
//!
//! A single session may hold a merchant identity and a customer identity at
//! the same time. These enums name the stored credentials and the identities
//! they belong to; the credential values themselves live in the client's
//! credential store.

use serde::{Deserialize, Serialize};

/// The kinds of bearer credential the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    /// Short-lived merchant/staff access token.
    MerchantAccess,
    /// Long-lived merchant refresh token, exchanged at the identity service.
    MerchantRefresh,
    /// Storefront customer access token. Customers have no refresh chain.
    CustomerAccess,
}

impl CredentialKind {
    /// All credential kinds, in storage order.
    pub const ALL: [Self; 3] = [
        Self::MerchantAccess,
        Self::MerchantRefresh,
        Self::CustomerAccess,
    ];

    /// Persisted storage key for this credential.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::MerchantAccess => "merchantAccessToken",
            Self::MerchantRefresh => "merchantRefreshToken",
            Self::CustomerAccess => "customerAccessToken",
        }
    }

    /// The identity this credential belongs to.
    #[must_use]
    pub const fn identity(self) -> IdentityKind {
        match self {
            Self::MerchantAccess | Self::MerchantRefresh => IdentityKind::Merchant,
            Self::CustomerAccess => IdentityKind::Customer,
        }
    }
}

/// Which identity a request was authenticated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Merchant/staff identity (dashboard side).
    Merchant,
    /// Storefront shopper identity.
    Customer,
    /// A credential supplied verbatim by the caller.
    Explicit,
}

impl std::fmt::Display for IdentityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merchant => write!(f, "merchant"),
            Self::Customer => write!(f, "customer"),
            Self::Explicit => write!(f, "explicit"),
        }
    }
}

/// Which stored credentials a clear operation removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearScope {
    /// Merchant access, refresh and profile.
    Merchant,
    /// Customer access and profile.
    Customer,
    /// Every identity plus the cached profiles.
    All,
}

impl ClearScope {
    /// Whether this scope covers the given credential kind.
    #[must_use]
    pub const fn covers(self, kind: CredentialKind) -> bool {
        match self {
            Self::All => true,
            Self::Merchant => matches!(kind.identity(), IdentityKind::Merchant),
            Self::Customer => matches!(kind.identity(), IdentityKind::Customer),
        }
    }
}

impl std::str::FromStr for ClearScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merchant" => Ok(Self::Merchant),
            "customer" => Ok(Self::Customer),
            "all" => Ok(Self::All),
            _ => Err(format!("invalid clear scope: {s}")),
        }
    }
}
