//! Core types for Shopfront.
//!
//! This module provides type-safe wrappers for tenant and identity concepts.

pub mod credential;
pub mod domain;
pub mod id;
pub mod profile;
pub mod role;
pub mod tenant;

pub use credential::{ClearScope, CredentialKind, IdentityKind};
pub use domain::{Subdomain, SubdomainError};
pub use id::*;
pub use profile::{CustomerProfileSnapshot, TenantBound, UserProfileSnapshot};
pub use role::MerchantRole;
pub use tenant::{TenantContext, TenantSource};
