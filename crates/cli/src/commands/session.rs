//! Stored session management.
//!
//! # Usage
//!
//! ```bash
//! shopfront session login -e owner@acme.test
//! shopfront session merchant --access-token "$ACCESS" --refresh-token "$REFRESH"
//! shopfront session customer --token "$CUSTOMER"
//! shopfront session show
//! shopfront session clear --scope merchant
//! ```

use secrecy::SecretString;
use serde_json::json;
use shopfront_client::{MerchantTokens, ShopfrontClient};
use shopfront_core::{ClearScope, CredentialKind, CustomerProfileSnapshot, UserProfileSnapshot};

use super::{CliError, print_json};

/// Print which identities are stored. Token values are never shown.
pub fn show(client: &ShopfrontClient) -> Result<(), CliError> {
    let store = client.store();
    let merchant = store.get(CredentialKind::MerchantAccess);
    let remembered = store.remembered_tenant();

    print_json(&json!({
        "merchant": {
            "access_token": merchant.is_some(),
            "expires_at": merchant.and_then(|c| c.expires_at()),
            "refresh_token": store.get(CredentialKind::MerchantRefresh).is_some(),
            "profile": store.merchant_profile(),
        },
        "customer": {
            "access_token": store.get(CredentialKind::CustomerAccess).is_some(),
            "profile": store.customer_profile(),
        },
        "guest_session": store.guest_session_id().is_some(),
        "remembered_tenant": remembered.map(|r| json!({
            "subdomain": r.subdomain.as_str(),
            "tenant_id": r.tenant_id,
        })),
    }))
}

/// Log a merchant in.
pub async fn login(client: &ShopfrontClient, email: &str, password: String) -> Result<(), CliError> {
    let profile = client
        .session()
        .login_merchant(email, &SecretString::from(password))
        .await?;
    tracing::info!(email, role = %profile.role, "Logged in");
    print_json(&serde_json::to_value(&profile)?)
}

/// Store merchant tokens obtained elsewhere.
pub fn establish_merchant(client: &ShopfrontClient, access_token: String, refresh_token: Option<String>) {
    client.session().establish_merchant(
        &MerchantTokens {
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token.map(SecretString::from),
        },
        &UserProfileSnapshot::default(),
    );
}

/// Store a customer token.
pub fn establish_customer(client: &ShopfrontClient, token: String) {
    client
        .session()
        .establish_customer(&SecretString::from(token), &CustomerProfileSnapshot::default());
}

/// Clear stored credentials for `scope`.
pub fn clear(client: &ShopfrontClient, scope: ClearScope) {
    let session = client.session();
    match scope {
        ClearScope::Merchant => session.logout_merchant(),
        ClearScope::Customer => session.logout_customer(),
        ClearScope::All => session.logout_all(),
    }
}
