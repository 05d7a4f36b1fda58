//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SHOPFRONT_API_URL` - Base URL of the core business service
//! - `SHOPFRONT_IDENTITY_URL` - Base URL of the identity service
//! - `SHOPFRONT_PLATFORM_DOMAIN` - Platform root domain (e.g., shopfront.app)
//!
//! ## Optional
//! - `SHOPFRONT_DEV_DOMAINS` - Comma-separated development roots (default: localhost)
//! - `SHOPFRONT_RESERVED_SUBDOMAINS` - Labels that are never tenants (default: www,app,api,admin)
//! - `SHOPFRONT_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 60)
//! - `SHOPFRONT_PROTECTED_PREFIXES` - Comma-separated protected page prefixes (default: /dashboard,/setup)
//! - `SHOPFRONT_AUTH_PREFIXES` - Comma-separated login/registration page prefixes
//! - `SHOPFRONT_MERCHANT_LOGIN_PATH` - Merchant login page (default: /login)
//! - `SHOPFRONT_CUSTOMER_LOGIN_PATH` - Customer login page (default: /account/login)
//! - `SHOPFRONT_STORAGE_PATH` - JSON file backing the durable credential tier
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::page::PagePolicy;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Shopfront client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Core business service base URL
    pub api_base_url: String,
    /// Identity service base URL
    pub identity_base_url: String,
    /// Tenant routing configuration
    pub tenancy: TenancyConfig,
    /// Protected/auth page configuration
    pub pages: PagePolicy,
    /// Identity service endpoints
    pub auth_endpoints: AuthEndpoints,
    /// Default per-request timeout
    pub request_timeout: Duration,
    /// JSON file backing the durable credential tier
    pub storage_path: Option<PathBuf>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// How tenants are recognised from page addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenancyConfig {
    /// Platform root domain; tenants live at `{sub}.{platform_domain}`
    pub platform_domain: String,
    /// Development roots where `{sub}.{dev}` is also a tenant host
    pub dev_domains: Vec<String>,
    /// Labels that never name a tenant
    pub reserved_subdomains: Vec<String>,
    /// Page query parameters that name a tenant explicitly
    pub tenant_query_params: Vec<String>,
    /// Page query parameter carrying the tenant id
    pub tenant_id_query_param: String,
}

impl TenancyConfig {
    /// Defaults for the given platform domain.
    #[must_use]
    pub fn new(platform_domain: impl Into<String>) -> Self {
        Self {
            platform_domain: platform_domain.into().to_ascii_lowercase(),
            dev_domains: vec!["localhost".to_string()],
            reserved_subdomains: ["www", "app", "api", "admin"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            tenant_query_params: vec!["tenant".to_string(), "store".to_string()],
            tenant_id_query_param: "tenantId".to_string(),
        }
    }
}

/// Identity service endpoint paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// Refresh-token exchange
    pub refresh: String,
    /// Merchant email/password login
    pub login: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            refresh: "/auth/refresh".to_string(),
            login: "/auth/login".to_string(),
        }
    }
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the service
    /// URLs and platform domain.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if either URL does not parse.
    pub fn new(
        api_base_url: &str,
        identity_base_url: &str,
        platform_domain: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base_url: validate_base_url("SHOPFRONT_API_URL", api_base_url)?,
            identity_base_url: validate_base_url("SHOPFRONT_IDENTITY_URL", identity_base_url)?,
            tenancy: TenancyConfig::new(platform_domain),
            pages: PagePolicy::default(),
            auth_endpoints: AuthEndpoints::default(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            storage_path: None,
            sentry_dsn: None,
        })
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let mut config = Self::new(
            &get_required_env("SHOPFRONT_API_URL")?,
            &get_required_env("SHOPFRONT_IDENTITY_URL")?,
            &get_required_env("SHOPFRONT_PLATFORM_DOMAIN")?,
        )?;

        if let Some(dev) = get_list_env("SHOPFRONT_DEV_DOMAINS") {
            config.tenancy.dev_domains = dev;
        }
        if let Some(reserved) = get_list_env("SHOPFRONT_RESERVED_SUBDOMAINS") {
            config.tenancy.reserved_subdomains = reserved;
        }
        if let Some(protected) = get_list_env("SHOPFRONT_PROTECTED_PREFIXES") {
            config.pages.protected_prefixes = protected;
        }
        if let Some(auth) = get_list_env("SHOPFRONT_AUTH_PREFIXES") {
            config.pages.auth_prefixes = auth;
        }
        if let Some(path) = get_optional_env("SHOPFRONT_MERCHANT_LOGIN_PATH") {
            config.pages.merchant_login_path = path;
        }
        if let Some(path) = get_optional_env("SHOPFRONT_CUSTOMER_LOGIN_PATH") {
            config.pages.customer_login_path = path;
        }

        let timeout_secs = get_env_or_default(
            "SHOPFRONT_REQUEST_TIMEOUT_SECS",
            &DEFAULT_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("SHOPFRONT_REQUEST_TIMEOUT_SECS".to_string(), e.to_string())
        })?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "SHOPFRONT_REQUEST_TIMEOUT_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        config.request_timeout = Duration::from_secs(timeout_secs);

        config.storage_path = get_optional_env("SHOPFRONT_STORAGE_PATH").map(PathBuf::from);
        config.sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(config)
    }

    /// Override the default request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the page policy.
    #[must_use]
    pub fn with_pages(mut self, pages: PagePolicy) -> Self {
        self.pages = pages;
        self
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a comma-separated environment variable as a list.
fn get_list_env(key: &str) -> Option<Vec<String>> {
    get_optional_env(key).map(|raw| parse_list(&raw))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate a service base URL and strip any trailing slash.
fn validate_base_url(var_name: &str, value: &str) -> Result<String, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidEnvVar(var_name.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
