//! Shopfront CLI - Issue requests and inspect sessions.
//!
//! # Usage
//!
//! ```bash
//! # Issue a request as if from a tenant's dashboard
//! shopfront --page https://acme.shopfront.app/dashboard request get /orders --auth
//!
//! # Show which tenant and identity a request would use
//! shopfront --page https://shopfront.app/ resolve /cart
//!
//! # Log a merchant in and inspect the stored session
//! shopfront session login -e owner@acme.test
//! shopfront session show
//!
//! # Clear the customer session only
//! shopfront session clear --scope customer
//! ```
//!
//! # Commands
//!
//! - `request` - Send a request through the client pipeline
//! - `resolve` - Print the tenant and identity for a path
//! - `session` - Log in, establish, show and clear stored sessions
//!
//! Configuration is read from the environment (see `shopfront_client::config`).
//! Sessions persist in `SHOPFRONT_STORAGE_PATH`, defaulting to
//! `.shopfront-session.json` in the working directory.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopfront_client::{
    ClientConfig, DefaultTranslator, ErrorPresenter, PageLocation, PageNavigator, ShopfrontClient,
};
use shopfront_core::ClearScope;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::CliError;

const DEFAULT_STORAGE_FILE: &str = ".shopfront-session.json";

#[derive(Parser)]
#[command(name = "shopfront")]
#[command(author, version, about = "Shopfront CLI tools")]
struct Cli {
    /// Page the request is issued from; drives tenant resolution
    #[arg(long, global = true, env = "SHOPFRONT_PAGE_URL", default_value = "http://localhost/")]
    page: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a request through the client pipeline
    Request {
        /// HTTP method (get, post, put, patch, delete)
        method: String,

        /// Request path, e.g. /orders
        path: String,

        /// Fail instead of falling back to an anonymous request
        #[arg(long)]
        auth: bool,

        /// JSON request body
        #[arg(short, long)]
        body: Option<String>,

        /// Query parameter as key=value; repeatable
        #[arg(short, long = "query")]
        query: Vec<String>,

        /// Address the identity service instead of the core service
        #[arg(long)]
        identity_service: bool,
    },
    /// Print the tenant and identity a request to PATH would use
    Resolve {
        /// Request path, e.g. /cart
        path: String,
    },
    /// Manage stored sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Show stored identities and session inputs
    Show,
    /// Log a merchant in with email and password
    Login {
        /// Merchant email address
        #[arg(short, long)]
        email: String,

        /// Password; read from `SHOPFRONT_PASSWORD` when omitted
        #[arg(short, long, env = "SHOPFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Store merchant tokens obtained elsewhere
    Merchant {
        /// Access token
        #[arg(long)]
        access_token: String,

        /// Refresh token
        #[arg(long)]
        refresh_token: Option<String>,
    },
    /// Store a customer token
    Customer {
        /// Access token
        #[arg(long)]
        token: String,
    },
    /// Clear stored credentials
    Clear {
        /// Which identity to clear (merchant, customer, all)
        #[arg(short, long, default_value = "all")]
        scope: ClearScope,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopfront_client=info,shopfront=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if config.storage_path.is_none() {
        config.storage_path = Some(PathBuf::from(DEFAULT_STORAGE_FILE));
    }

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CliError> {
    let page = PageLocation::parse(&cli.page)
        .map_err(|e| CliError::InvalidArgument(format!("--page: {e}")))?;
    let client = build_client(config)?;
    client.set_page(page).await;

    match cli.command {
        Commands::Request {
            method,
            path,
            auth,
            body,
            query,
            identity_service,
        } => {
            commands::request::run(
                &client,
                &commands::request::RequestArgs {
                    method,
                    path,
                    auth,
                    body,
                    query,
                    identity_service,
                },
            )
            .await
        }
        Commands::Resolve { path } => commands::resolve::run(&client, &path).await,
        Commands::Session { action } => match action {
            SessionAction::Show => commands::session::show(&client),
            SessionAction::Login { email, password } => {
                commands::session::login(&client, &email, password).await
            }
            SessionAction::Merchant {
                access_token,
                refresh_token,
            } => {
                commands::session::establish_merchant(&client, access_token, refresh_token);
                Ok(())
            }
            SessionAction::Customer { token } => {
                commands::session::establish_customer(&client, token);
                Ok(())
            }
            SessionAction::Clear { scope } => {
                commands::session::clear(&client, scope);
                Ok(())
            }
        },
    }
}

fn build_client(config: ClientConfig) -> Result<ShopfrontClient, CliError> {
    let page = shopfront_client::CurrentPage::default();
    let presenter = ErrorPresenter::new(
        Arc::new(DefaultTranslator::default()),
        Arc::new(commands::TracingNotifier),
        Arc::new(PageNavigator::new(page.clone())),
        config.pages.clone(),
    );

    Ok(ShopfrontClient::builder(config)
        .page(page)
        .presenter(presenter)
        .build()?)
}
