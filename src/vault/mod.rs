//! # Vault Certificate Clients
//!
//! Everything that talks to Vault PKI, behind one capability trait:
//!
//! - [`CertificateClient`]: the contract callers depend on
//! - [`VaultCertificateClient`]: one Vault server, one or more mounts, cached listings
//! - [`DisabledClient`]: stand-in when no vault is configured
//! - [`MultiVaultClient`]: aggregates many vaults behind composite ids
//! - [`PkiConnection`]: the wire protocol, implemented over HTTP by [`HttpPkiConnection`]
//!
//! # Example
//!
//! ```rust,ignore
//! use pkiview::config::AppConfig;
//! use pkiview::vault::VaultRegistry;
//!
//! let config = AppConfig::from_env()?;
//! let registry = VaultRegistry::from_config(&config);
//! let certificates = registry.client().list_certificates().await?;
//! ```

mod client;
mod connection;
mod disabled;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
mod multi;
mod real;
mod registry;

pub use client::{CertificateClient, VaultListing};
pub use connection::{HealthStatus, HttpPkiConnection, PkiConnection, TlsOptions};
pub use disabled::DisabledClient;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockCertificateClient, MockPkiConnection};
pub use multi::{compose_id, parse_composite_id, MultiVaultClient, COMPOSITE_SEPARATOR};
pub use real::VaultCertificateClient;
pub use registry::{build_client, VaultRegistry};
