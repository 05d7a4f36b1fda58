//! Send a request through the client pipeline.
//!
//! # Usage
//!
//! ```bash
//! shopfront --page https://acme.shopfront.app/dashboard request get /orders --auth -q status=open
//! shopfront request post /cart/items -b '{"variantId": "v1", "quantity": 2}'
//! ```

use serde_json::Value;
use shopfront_client::{Method, RequestOptions, Service, ShopfrontClient};

use super::{CliError, print_json};

/// Arguments of the `request` command.
pub struct RequestArgs {
    pub method: String,
    pub path: String,
    pub auth: bool,
    pub body: Option<String>,
    pub query: Vec<String>,
    pub identity_service: bool,
}

/// Build request options from command-line arguments.
pub fn options(args: &RequestArgs) -> Result<RequestOptions, CliError> {
    let method: Method = args
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("unknown method '{}'", args.method)))?;

    let mut options = RequestOptions::get().method(method);
    if let Some(raw) = &args.body {
        let body: Value = serde_json::from_str(raw)
            .map_err(|e| CliError::InvalidArgument(format!("--body is not JSON: {e}")))?;
        options = options.json(&body);
    }
    for pair in &args.query {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgument(format!("--query expects key=value, got '{pair}'")))?;
        options = options.query(key, value);
    }
    if args.auth {
        options = options.auth_required();
    }
    if args.identity_service {
        options = options.service(Service::Identity);
    }
    Ok(options)
}

/// Execute the request and print the unwrapped payload.
pub async fn run(client: &ShopfrontClient, args: &RequestArgs) -> Result<(), CliError> {
    let options = options(args)?;
    tracing::debug!(?options, path = %args.path, "Executing request");
    let value = client.execute(&args.path, options).await?;
    print_json(&value)
}
