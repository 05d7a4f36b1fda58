//! Merchant staff roles.

use serde::{Deserialize, Serialize};

/// Staff role within a tenant, as reported by the identity service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MerchantRole {
    /// Store owner, full access including billing and staff management.
    Owner,
    /// Full access to store management features.
    Admin,
    /// Day-to-day operations (orders, products, customers).
    #[default]
    Staff,
    /// Support tickets only.
    Support,
    /// Platform operator acting across tenants.
    PlatformAdmin,
}

impl std::fmt::Display for MerchantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Staff => write!(f, "staff"),
            Self::Support => write!(f, "support"),
            Self::PlatformAdmin => write!(f, "platform_admin"),
        }
    }
}

impl std::str::FromStr for MerchantRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "support" => Ok(Self::Support),
            "platform_admin" => Ok(Self::PlatformAdmin),
            _ => Err(format!("invalid merchant role: {s}")),
        }
    }
}
