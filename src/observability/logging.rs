//! # Structured Logging
//!
//! Subscriber installation and span macros for Vault operations.

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::{CatalogError, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Create a tracing span for a Vault backend operation.
///
/// ```rust,ignore
/// let span = vault_span!("list_certificates", "prod");
/// let span = vault_span!("revoke", "prod", mount = "pki", serial = "1a:2b");
/// ```
#[macro_export]
macro_rules! vault_span {
    ($operation:expr, $vault_id:expr) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            vault_id = %$vault_id
        )
    };
    ($operation:expr, $vault_id:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "vault_operation",
            operation = %$operation,
            vault_id = %$vault_id,
            $($field)*
        )
    };
}

/// Create a tracing span for an operation spanning every configured vault.
#[macro_export]
macro_rules! catalog_span {
    ($operation:expr) => {
        tracing::info_span!(
            "catalog_operation",
            operation = %$operation,
            vault_count = tracing::field::Empty
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "catalog_operation",
            operation = %$operation,
            vault_count = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns `false`
/// when a subscriber was already installed (e.g. by a test harness).
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            CatalogError::config(format!("invalid log level '{}': {}", config.level, e))
        })?,
    };

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .is_ok(),
    };
    Ok(installed)
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        environment = config.environment.as_str(),
        vault_count = config.vaults.len(),
        vault_ids = ?config.vault_ids(),
        cache_ttl_secs = config.cache.ttl.as_secs(),
        cleanup_interval_secs = config.cache.cleanup_interval.as_secs(),
        request_timeout_secs = config.request_timeout.as_secs(),
        "pkiview configuration"
    );
}
