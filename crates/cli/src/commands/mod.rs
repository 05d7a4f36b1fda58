//! CLI command implementations.

pub mod request;
pub mod resolve;
pub mod session;

use serde_json::Value;
use shopfront_client::{ApiError, BuildError, Notifier, NotifyLevel};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    /// A command-line argument could not be interpreted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The client could not be built.
    #[error("Client setup failed: {0}")]
    Build(#[from] BuildError),

    /// The request failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Output could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Notifier that reports through the tracing subscriber.
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, title: &str, description: &str) {
        match level {
            NotifyLevel::Error => tracing::error!(%title, %description, "Notification"),
            NotifyLevel::Warning => tracing::warn!(%title, %description, "Notification"),
            NotifyLevel::Info => tracing::info!(%title, %description, "Notification"),
        }
    }
}

/// Write a JSON document to stdout.
#[allow(clippy::print_stdout)]
pub fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
