//! Capability interface shared by every certificate client.

use crate::certs::{Certificate, DetailedCertificate, PemResponse};
use crate::errors::{CatalogError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Contract every backend-facing certificate client satisfies.
///
/// Callers hold an `Arc<dyn CertificateClient>` and never branch on the
/// concrete variant (disabled, single vault, or aggregator). Every error
/// means "this backend is unusable for this call"; none is fatal.
#[async_trait]
pub trait CertificateClient: Send + Sync {
    /// Every certificate the backend knows, sorted by common name then id.
    async fn list_certificates(&self) -> Result<Vec<Certificate>>;

    async fn get_certificate_details(&self, id: &str) -> Result<DetailedCertificate>;

    async fn get_certificate_pem(&self, id: &str) -> Result<PemResponse>;

    /// Forward a revocation to exactly one backend, authorized by a
    /// caller-supplied write token. Cached listings are left untouched.
    async fn revoke_certificate(&self, id: &str, write_token: &str) -> Result<()>;

    /// Liveness check: the backend is reachable, initialized, unsealed and
    /// accepts the read token.
    async fn check_connection(&self) -> Result<()>;

    /// Drop cached data. Never fails.
    fn invalidate_cache(&self);

    /// Stop background work. Idempotent.
    fn shutdown(&self);

    /// Number of cached entries, for diagnostics.
    fn cache_size(&self) -> usize {
        0
    }
}

/// Outcome of listing one vault during a diagnostic fan-out.
#[derive(Debug, Clone)]
pub struct VaultListing {
    pub vault_id: String,
    /// Composite-id certificates; empty when `error` is set
    pub certificates: Vec<Certificate>,
    /// Wall-clock time of this vault's call; zero for a missing client
    pub duration: Duration,
    pub error: Option<CatalogError>,
}

impl VaultListing {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
