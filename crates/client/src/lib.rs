//! Shopfront client library.
//!
//! A tenant-aware, identity-aware HTTP client for the Shopfront platform.
//! Every request is routed to the right tenant, carries at most one of the
//! stored merchant or customer identities, survives access-token expiry
//! through a single-flight refresh, and fails with a typed [`ApiError`].
//!
//! # Modules
//!
//! - [`credentials`] - Persisted tokens, profiles and session inputs
//! - [`tenant`] - Tenant resolution from the current page
//! - [`identity`] - Endpoint classification and identity selection
//! - [`refresh`] - Single-flight merchant session refresh
//! - [`executor`] - The request pipeline and [`ShopfrontClient`]
//! - [`presenter`] - Notifications and redirects for failed requests
//! - [`session`] - Login and logout

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod identity;
pub mod page;
pub mod presenter;
pub mod refresh;
pub mod session;
pub mod tenant;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AuthEndpoints, ClientConfig, ConfigError, TenancyConfig};
pub use credentials::{CredentialStore, FileTier, MemoryTier, StorageTier};
pub use error::{ApiError, ErrorBody, ErrorMessage};
pub use executor::{
    BuildError, ClientBuilder, MultipartBody, RequestOptions, SESSION_HEADER, Service,
    ShopfrontClient,
};
pub use identity::{EndpointScope, IdentitySelector, RouteTable, Selection};
pub use page::{CurrentPage, PageLocation, PagePolicy};
pub use presenter::{
    DefaultTranslator, Disposition, ErrorContext, ErrorPresenter, Navigator, Notification,
    Notifier, NotifyLevel, PageNavigator, Translator,
};
pub use refresh::{RefreshCoordinator, RefreshError, TokenRefresher};
pub use session::{MerchantTokens, SessionManager};
pub use reqwest::Method;
pub use tenant::TenantResolver;
