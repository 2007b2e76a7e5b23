//! Single-vault certificate client
//!
//! Serves one Vault server with one or more PKI mounts. Listings are
//! cached under a single key for the configured TTL; a background task
//! sweeps expired entries until [`CertificateClient::shutdown`].

use super::client::CertificateClient;
use super::connection::{HttpPkiConnection, PkiConnection};
use crate::cache::TtlCache;
use crate::certs::{
    decode_certificate, sort_certificates, Certificate, DecodedCertificate, DetailedCertificate,
    PemResponse,
};
use crate::config::{CacheSettings, VaultInstance};
use crate::errors::{CatalogError, Result};
use crate::vault_span;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

const LIST_CACHE_KEY: &str = "list";

/// Certificate reads issued concurrently while listing one mount
const READ_CONCURRENCY: usize = 8;

/// Certificate client for one Vault server.
pub struct VaultCertificateClient {
    vault_id: String,
    connection: Arc<dyn PkiConnection>,
    mounts: Vec<String>,
    cache: Arc<TtlCache<Vec<Certificate>>>,
    sweeper: CancellationToken,
}

impl std::fmt::Debug for VaultCertificateClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultCertificateClient")
            .field("vault_id", &self.vault_id)
            .field("mounts", &self.mounts)
            .field("cache_ttl", &self.cache.ttl())
            .field("connection", &"[PkiConnection]")
            .finish()
    }
}

impl VaultCertificateClient {
    /// Create a client and start its cache sweeper.
    ///
    /// Must be called within a tokio runtime for the sweeper to run;
    /// without one, expired entries are still ignored on read but only
    /// removed by explicit invalidation.
    pub fn new(
        vault_id: impl Into<String>,
        connection: Arc<dyn PkiConnection>,
        mounts: Vec<String>,
        settings: CacheSettings,
    ) -> Self {
        let vault_id = vault_id.into();
        let cache = Arc::new(TtlCache::new(settings.ttl));
        let sweeper = CancellationToken::new();

        spawn_sweeper(
            vault_id.clone(),
            Arc::clone(&cache),
            settings.cleanup_interval,
            sweeper.clone(),
        );

        debug!(
            vault_id = %vault_id,
            mounts = ?mounts,
            cache_ttl_secs = settings.ttl.as_secs(),
            "Created vault certificate client"
        );

        Self { vault_id, connection, mounts, cache, sweeper }
    }

    /// Create a client talking HTTP to a configured instance.
    pub fn from_instance(
        instance: &VaultInstance,
        settings: &CacheSettings,
        request_timeout: Duration,
    ) -> Result<Self> {
        let connection = HttpPkiConnection::from_instance(instance, request_timeout)?;
        Ok(Self::new(
            instance.id.clone(),
            Arc::new(connection),
            instance.pki_mounts.clone(),
            *settings,
        ))
    }

    pub fn vault_id(&self) -> &str {
        &self.vault_id
    }

    pub fn mounts(&self) -> &[String] {
        &self.mounts
    }

    pub fn is_shut_down(&self) -> bool {
        self.sweeper.is_cancelled()
    }

    /// Resolve a certificate id to `(mount, serial)`.
    ///
    /// `mount:serial` is split on the first colon when the prefix is a
    /// configured mount. Any other value is a bare serial, which requires
    /// exactly one configured mount since serials contain colons themselves.
    pub fn resolve_id(&self, id: &str) -> Result<(String, String)> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CatalogError::invalid_id(id));
        }

        if let Some((prefix, serial)) = id.split_once(':') {
            if self.mounts.iter().any(|mount| mount == prefix) {
                if !is_serial(serial) {
                    return Err(CatalogError::invalid_id(id));
                }
                return Ok((prefix.to_string(), serial.to_string()));
            }
        }

        match self.mounts.as_slice() {
            [_] if !is_serial(id) => Err(CatalogError::invalid_id(id)),
            [only] => Ok((only.clone(), id.to_string())),
            _ => Err(CatalogError::UnresolvableId { id: id.to_string() }),
        }
    }

    /// Current CRL of a configured mount, PEM encoded.
    pub async fn read_crl(&self, mount: &str) -> Result<String> {
        self.ensure_mount(mount)?;
        self.connection.read_crl(mount).await
    }

    /// Force the mount to rebuild its CRL.
    pub async fn rotate_crl(&self, mount: &str) -> Result<()> {
        self.ensure_mount(mount)?;
        self.connection.rotate_crl(mount).await?;
        info!(vault_id = %self.vault_id, mount = %mount, "Rotated CRL");
        Ok(())
    }

    fn ensure_mount(&self, mount: &str) -> Result<()> {
        if self.mounts.iter().any(|configured| configured == mount) {
            Ok(())
        } else {
            Err(CatalogError::UnknownMount { mount: mount.to_string() })
        }
    }

    async fn revoked_serials(&self, mount: &str) -> Result<HashSet<String>> {
        Ok(self.connection.list_revoked(mount).await?.into_iter().collect())
    }

    async fn read_pem(&self, mount: &str, serial: &str) -> Result<String> {
        self.connection
            .read_certificate(mount, serial)
            .await?
            .ok_or_else(|| CatalogError::not_found(mount, serial))
    }

    async fn read_decoded(
        &self,
        mount: &str,
        serial: &str,
    ) -> Result<(String, DecodedCertificate)> {
        let pem = self.read_pem(mount, serial).await?;
        let decoded = decode_certificate(&pem)
            .map_err(|e| CatalogError::decode(mount, serial, e.to_string()))?;
        Ok((pem, decoded))
    }

    /// List one mount, skipping records that cannot be read or decoded.
    async fn list_mount(&self, mount: &str) -> Result<Vec<Certificate>> {
        let serials = self.connection.list_serials(mount).await?;
        let revoked = self.revoked_serials(mount).await?;

        let revoked_serials = &revoked;
        let certificates: Vec<Certificate> = stream::iter(serials)
            .map(move |serial| async move {
                match self.read_decoded(mount, &serial).await {
                    Ok((_, decoded)) => {
                        let mut certificate =
                            Certificate::from_decoded(format!("{}:{}", mount, serial), &decoded);
                        if revoked_serials.contains(&serial) {
                            certificate.mark_revoked();
                        }
                        Some(certificate)
                    }
                    Err(e) => {
                        warn!(
                            vault_id = %self.vault_id,
                            mount = %mount,
                            serial = %serial,
                            error = %e,
                            "Skipping unreadable certificate"
                        );
                        None
                    }
                }
            })
            .buffered(READ_CONCURRENCY)
            .filter_map(|certificate| async move { certificate })
            .collect()
            .await;

        debug!(
            vault_id = %self.vault_id,
            mount = %mount,
            certificate_count = certificates.len(),
            revoked_count = revoked.len(),
            "Listed mount"
        );
        Ok(certificates)
    }
}

fn spawn_sweeper(
    vault_id: String,
    cache: Arc<TtlCache<Vec<Certificate>>>,
    interval: Duration,
    token: CancellationToken,
) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!(vault_id = %vault_id, "No tokio runtime, cache sweeper not started");
        return;
    };
    let interval = interval.max(Duration::from_millis(1));

    handle.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(vault_id = %vault_id, "Cache sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = cache.cleanup();
                    if removed > 0 {
                        debug!(vault_id = %vault_id, removed, "Swept expired cache entries");
                    }
                }
            }
        }
    });
}

/// Serials are a single path segment below `{mount}/cert/`.
fn is_serial(serial: &str) -> bool {
    !serial.is_empty() && !serial.contains('/') && serial != "." && serial != ".."
}

#[async_trait]
impl CertificateClient for VaultCertificateClient {
    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        if let Some(cached) = self.cache.get(LIST_CACHE_KEY) {
            debug!(
                vault_id = %self.vault_id,
                certificate_count = cached.len(),
                "Serving certificate list from cache"
            );
            return Ok(cached);
        }

        async {
            let mut certificates = Vec::new();
            let mut listed_mounts = 0usize;
            let mut last_error = None;

            for mount in &self.mounts {
                match self.list_mount(mount).await {
                    Ok(found) => {
                        listed_mounts += 1;
                        certificates.extend(found);
                    }
                    Err(e) => {
                        warn!(
                            vault_id = %self.vault_id,
                            mount = %mount,
                            error = %e,
                            "Failed to list mount, skipping"
                        );
                        last_error = Some(e);
                    }
                }
            }

            if listed_mounts == 0 {
                if let Some(e) = last_error {
                    return Err(e);
                }
            }

            sort_certificates(&mut certificates);
            self.cache.set(LIST_CACHE_KEY, certificates.clone());

            info!(
                vault_id = %self.vault_id,
                certificate_count = certificates.len(),
                mounts = listed_mounts,
                "Listed certificates"
            );
            Ok(certificates)
        }
        .instrument(vault_span!("list_certificates", self.vault_id))
        .await
    }

    async fn get_certificate_details(&self, id: &str) -> Result<DetailedCertificate> {
        let (mount, serial) = self.resolve_id(id)?;
        let (pem, decoded) = self.read_decoded(&mount, &serial).await?;
        let revoked = self.revoked_serials(&mount).await?;

        let id = format!("{}:{}", mount, serial);
        let mut details = DetailedCertificate::from_decoded(id, &serial, decoded, pem);
        if revoked.contains(&serial) {
            details.certificate.mark_revoked();
        }
        Ok(details)
    }

    async fn get_certificate_pem(&self, id: &str) -> Result<PemResponse> {
        let (mount, serial) = self.resolve_id(id)?;
        let pem = self.read_pem(&mount, &serial).await?;
        Ok(PemResponse { serial_number: serial, pem })
    }

    async fn revoke_certificate(&self, id: &str, write_token: &str) -> Result<()> {
        let write_token = write_token.trim();
        if write_token.is_empty() {
            return Err(CatalogError::MissingWriteToken);
        }
        let (mount, serial) = self.resolve_id(id)?;

        async {
            self.connection.revoke(&mount, &serial, write_token).await?;
            info!(
                vault_id = %self.vault_id,
                mount = %mount,
                serial = %serial,
                "Revoked certificate"
            );
            Ok::<(), CatalogError>(())
        }
        .instrument(vault_span!(
            "revoke_certificate",
            self.vault_id,
            mount = %mount,
            serial = %serial
        ))
        .await
    }

    async fn check_connection(&self) -> Result<()> {
        let health = self.connection.health().await?;
        if !health.initialized {
            return Err(CatalogError::Uninitialized);
        }
        if health.sealed {
            return Err(CatalogError::Sealed);
        }
        // An unsealed server can still reject the read token.
        self.connection.lookup_self().await
    }

    fn invalidate_cache(&self) {
        self.cache.clear();
        debug!(vault_id = %self.vault_id, "Certificate cache invalidated");
    }

    fn shutdown(&self) {
        if !self.sweeper.is_cancelled() {
            info!(vault_id = %self.vault_id, "Shutting down vault certificate client");
        }
        self.sweeper.cancel();
    }

    fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for VaultCertificateClient {
    fn drop(&mut self) {
        self.sweeper.cancel();
    }
}
