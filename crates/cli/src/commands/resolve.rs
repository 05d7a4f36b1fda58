//! Show how a request would be routed.
//!
//! # Usage
//!
//! ```bash
//! shopfront --page "https://shopfront.app/?tenant=acme" resolve /cart
//! ```

use serde_json::json;
use shopfront_client::ShopfrontClient;

use super::{CliError, print_json};

/// Print the tenant context and identity a request to `path` would use.
pub async fn run(client: &ShopfrontClient, path: &str) -> Result<(), CliError> {
    let (tenant, selection) = client.resolve(path).await;
    print_json(&json!({
        "tenant": tenant,
        "scope": selection.scope,
        "identity": selection.identity,
        "authenticated": selection.is_authenticated(),
    }))
}
