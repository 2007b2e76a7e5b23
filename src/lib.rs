//! # pkiview
//!
//! A unified, cached, read-mostly catalog of X.509 certificates issued by
//! one or more HashiCorp Vault PKI backends.
//!
//! ## Architecture
//!
//! ```text
//! CLI → CertificateClient ─┬─ DisabledClient
//!                          └─ MultiVaultClient ─→ VaultCertificateClient (per vault)
//!                                                     ├─ TtlCache + sweeper
//!                                                     └─ PkiConnection (Vault HTTP API)
//! ```
//!
//! Callers hold one `Arc<dyn CertificateClient>` and never branch on the
//! concrete variant. The aggregator tolerates unreachable vaults: listings
//! return whatever the healthy vaults report, and a per-vault diagnostic
//! fan-out shows which backend is slow or down.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pkiview::{AppConfig, Result, VaultRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let registry = VaultRegistry::from_config(&config);
//!     for certificate in registry.client().list_certificates().await? {
//!         println!("{} {}", certificate.id, certificate.common_name);
//!     }
//!     registry.shutdown();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod certs;
pub mod config;
pub mod errors;
pub mod observability;
pub mod vault;

pub use cache::TtlCache;
pub use certs::{Certificate, DetailedCertificate, PemResponse};
pub use config::AppConfig;
pub use errors::{CatalogError, Result};
pub use vault::{
    build_client, CertificateClient, DisabledClient, MultiVaultClient, VaultCertificateClient,
    VaultListing, VaultRegistry,
};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
