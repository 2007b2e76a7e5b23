//! Stand-in client used when no vault is configured.

use super::client::CertificateClient;
use crate::certs::{Certificate, DetailedCertificate, PemResponse};
use crate::errors::{CatalogError, Result};
use async_trait::async_trait;

/// Client for a deployment without any vault.
///
/// Listing succeeds with an empty catalog; every other operation reports
/// [`CatalogError::NotConfigured`] so health reporting can tell an
/// intentionally disabled backend from an outage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledClient;

impl DisabledClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CertificateClient for DisabledClient {
    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(Vec::new())
    }

    async fn get_certificate_details(&self, _id: &str) -> Result<DetailedCertificate> {
        Err(CatalogError::NotConfigured)
    }

    async fn get_certificate_pem(&self, _id: &str) -> Result<PemResponse> {
        Err(CatalogError::NotConfigured)
    }

    async fn revoke_certificate(&self, _id: &str, _write_token: &str) -> Result<()> {
        Err(CatalogError::NotConfigured)
    }

    async fn check_connection(&self) -> Result<()> {
        Err(CatalogError::NotConfigured)
    }

    fn invalidate_cache(&self) {}

    fn shutdown(&self) {}
}
