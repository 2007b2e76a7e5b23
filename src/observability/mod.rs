//! # Observability Infrastructure
//!
//! Structured logging for the certificate catalog. Spans are created with
//! the [`vault_span!`](crate::vault_span) and
//! [`catalog_span!`](crate::catalog_span) macros.

pub mod logging;

pub use logging::{init_logging, log_config_info};
