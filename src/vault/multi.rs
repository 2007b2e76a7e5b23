//! Multi-vault aggregator
//!
//! Presents several certificate clients as one catalog. Certificates are
//! addressed globally as `vault_id|mount_serial`; the aggregator adds the
//! prefix on the way out and strips it on the way in.

use super::client::{CertificateClient, VaultListing};
use crate::catalog_span;
use crate::certs::{sort_certificates, Certificate, DetailedCertificate, PemResponse};
use crate::errors::{CatalogError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn, Instrument};

/// Separator between the vault id and the client-local certificate id
pub const COMPOSITE_SEPARATOR: char = '|';

/// Mint a composite id from a vault id and a client-local id.
pub fn compose_id(vault_id: &str, mount_serial: &str) -> String {
    format!("{}{}{}", vault_id, COMPOSITE_SEPARATOR, mount_serial)
}

/// Split a composite id into `(vault_id, mount_serial)`.
///
/// The value is split on the first separator and both halves trimmed;
/// either half being empty is an error. A value without a separator is
/// addressed to the sole vault and is rejected unless exactly one exists.
pub fn parse_composite_id(vault_ids: &[String], value: &str) -> Result<(String, String)> {
    if let Some((vault_id, mount_serial)) = value.split_once(COMPOSITE_SEPARATOR) {
        let vault_id = vault_id.trim();
        let mount_serial = mount_serial.trim();
        if vault_id.is_empty() || mount_serial.is_empty() {
            return Err(CatalogError::invalid_id(value));
        }
        return Ok((vault_id.to_string(), mount_serial.to_string()));
    }

    let mount_serial = value.trim();
    match vault_ids {
        [only] if !mount_serial.is_empty() => Ok((only.clone(), mount_serial.to_string())),
        _ => Err(CatalogError::invalid_id(value)),
    }
}

/// A vault id survives a compose/parse round trip unchanged.
fn is_addressable(vault_id: &str) -> bool {
    !vault_id.is_empty() && vault_id.trim() == vault_id && !vault_id.contains(COMPOSITE_SEPARATOR)
}

fn prefixed(vault_id: &str, certificates: Vec<Certificate>) -> Vec<Certificate> {
    certificates
        .into_iter()
        .map(|mut certificate| {
            certificate.id = compose_id(vault_id, &certificate.id);
            certificate
        })
        .collect()
}

/// Aggregates one certificate client per vault.
///
/// A vault id may map to `None` when its client could not be built; such
/// vaults are skipped by listings and reported as missing elsewhere.
pub struct MultiVaultClient {
    vault_ids: Vec<String>,
    clients: HashMap<String, Option<Arc<dyn CertificateClient>>>,
}

impl std::fmt::Debug for MultiVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let missing: Vec<&String> = self
            .vault_ids
            .iter()
            .filter(|id| self.client(id).is_none())
            .collect();
        f.debug_struct("MultiVaultClient")
            .field("vault_ids", &self.vault_ids)
            .field("missing", &missing)
            .finish()
    }
}

impl MultiVaultClient {
    /// Build the aggregator.
    ///
    /// Enumeration order follows `ordered_ids`, keeping only non-empty ids
    /// present in `clients`, first occurrence wins. When nothing survives,
    /// all keys of `clients` are used in lexicographic order. Keys that are
    /// not trimmed or contain [`COMPOSITE_SEPARATOR`] are never enumerated,
    /// since the ids minted for them would not parse back to the same vault.
    pub fn new<I, S>(
        ordered_ids: I,
        clients: HashMap<String, Option<Arc<dyn CertificateClient>>>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in clients.keys().filter(|key| !is_addressable(key)) {
            warn!(vault_id = %key, "Ignoring vault id that cannot be used in composite ids");
        }

        let mut seen = HashSet::new();
        let mut vault_ids: Vec<String> = ordered_ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| is_addressable(id) && clients.contains_key(id))
            .filter(|id| seen.insert(id.clone()))
            .collect();

        if vault_ids.is_empty() {
            vault_ids = clients
                .keys()
                .filter(|id| is_addressable(id))
                .cloned()
                .collect();
            vault_ids.sort();
        }

        debug!(vault_ids = ?vault_ids, "Created multi-vault client");
        Self { vault_ids, clients }
    }

    /// Vault ids in enumeration order
    pub fn vault_ids(&self) -> &[String] {
        &self.vault_ids
    }

    pub fn client(&self, vault_id: &str) -> Option<Arc<dyn CertificateClient>> {
        self.clients.get(vault_id).cloned().flatten()
    }

    fn require_client(&self, vault_id: &str) -> Result<Arc<dyn CertificateClient>> {
        self.client(vault_id)
            .ok_or_else(|| CatalogError::missing_client(vault_id))
    }

    fn resolve(&self, id: &str) -> Result<(String, String, Arc<dyn CertificateClient>)> {
        let (vault_id, mount_serial) = parse_composite_id(&self.vault_ids, id)?;
        let client = self.require_client(&vault_id)?;
        Ok((vault_id, mount_serial, client))
    }

    /// Every distinct client instance, compared by address.
    fn unique_clients(&self) -> Vec<Arc<dyn CertificateClient>> {
        let mut seen = HashSet::new();
        self.clients
            .values()
            .flatten()
            .filter(|client| seen.insert(Arc::as_ptr(client) as *const () as usize))
            .cloned()
            .collect()
    }

    /// List every vault concurrently, one outcome per vault in enumeration order.
    ///
    /// Each call is bounded by `deadline`; a call that overruns is recorded
    /// as [`CatalogError::Timeout`] for its vault. Missing clients are
    /// reported without being called and with a zero duration.
    pub async fn list_certificates_by_vault(&self, deadline: Duration) -> Vec<VaultListing> {
        let listings = self.vault_ids.iter().map(move |vault_id| async move {
            let Some(client) = self.client(vault_id) else {
                return VaultListing {
                    vault_id: vault_id.clone(),
                    certificates: Vec::new(),
                    duration: Duration::ZERO,
                    error: Some(CatalogError::missing_client(vault_id.as_str())),
                };
            };

            let started = Instant::now();
            let outcome = tokio::time::timeout(deadline, client.list_certificates()).await;
            let duration = started.elapsed();

            let (certificates, error) = match outcome {
                Ok(Ok(certificates)) => (prefixed(vault_id, certificates), None),
                Ok(Err(e)) => (Vec::new(), Some(e)),
                Err(_) => (
                    Vec::new(),
                    Some(CatalogError::Timeout { vault_id: vault_id.clone(), after: deadline }),
                ),
            };
            if let Some(e) = &error {
                warn!(
                    vault_id = %vault_id,
                    error = %e,
                    duration_ms = duration.as_millis() as u64,
                    "Vault listing failed"
                );
            }
            VaultListing { vault_id: vault_id.clone(), certificates, duration, error }
        });

        let span = catalog_span!(
            "list_certificates_by_vault",
            deadline_ms = deadline.as_millis() as u64
        );
        span.record("vault_count", self.vault_ids.len());
        join_all(listings).instrument(span).await
    }
}

#[async_trait]
impl CertificateClient for MultiVaultClient {
    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        if self.vault_ids.is_empty() {
            debug!("No vaults configured for certificate listing");
            return Err(CatalogError::NotConfigured);
        }

        let span = catalog_span!("list_certificates");
        span.record("vault_count", self.vault_ids.len());

        async {
            let mut all = Vec::new();
            let mut succeeded = 0usize;
            let mut last_error = None;

            for vault_id in &self.vault_ids {
                let client = match self.require_client(vault_id) {
                    Ok(client) => client,
                    Err(e) => {
                        error!(
                            vault_id = %vault_id,
                            "Missing vault client for certificate listing"
                        );
                        last_error = Some(e);
                        continue;
                    }
                };
                match client.list_certificates().await {
                    Ok(certificates) => {
                        debug!(
                            vault_id = %vault_id,
                            certificate_count = certificates.len(),
                            "Fetched certificates from vault"
                        );
                        succeeded += 1;
                        all.extend(prefixed(vault_id, certificates));
                    }
                    Err(e) => {
                        warn!(
                            vault_id = %vault_id,
                            error = %e,
                            "Failed to fetch certificates from vault"
                        );
                        last_error = Some(e);
                    }
                }
            }

            debug!(
                certificate_count = all.len(),
                successful_vaults = succeeded,
                total_vaults = self.vault_ids.len(),
                "Completed certificate listing"
            );

            if succeeded == 0 {
                return Err(last_error.unwrap_or(CatalogError::NotConfigured));
            }
            sort_certificates(&mut all);
            Ok(all)
        }
        .instrument(span)
        .await
    }

    async fn get_certificate_details(&self, id: &str) -> Result<DetailedCertificate> {
        let (vault_id, mount_serial, client) = self.resolve(id)?;
        let mut details = client.get_certificate_details(&mount_serial).await?;
        details.certificate.id = compose_id(&vault_id, &details.certificate.id);
        Ok(details)
    }

    async fn get_certificate_pem(&self, id: &str) -> Result<PemResponse> {
        let (_, mount_serial, client) = self.resolve(id)?;
        client.get_certificate_pem(&mount_serial).await
    }

    async fn revoke_certificate(&self, id: &str, write_token: &str) -> Result<()> {
        if write_token.trim().is_empty() {
            return Err(CatalogError::MissingWriteToken);
        }
        let (vault_id, mount_serial, client) = self.resolve(id)?;
        debug!(vault_id = %vault_id, id = %mount_serial, "Forwarding revocation");
        client.revoke_certificate(&mount_serial, write_token).await
    }

    async fn check_connection(&self) -> Result<()> {
        if self.vault_ids.is_empty() {
            debug!("No vaults configured for connection check");
            return Err(CatalogError::NotConfigured);
        }

        for vault_id in &self.vault_ids {
            let client = self.require_client(vault_id).inspect_err(|_| {
                error!(vault_id = %vault_id, "Missing vault client for connection check");
            })?;
            client.check_connection().await.inspect_err(|e| {
                error!(vault_id = %vault_id, error = %e, "Failed to connect to vault");
            })?;
            debug!(vault_id = %vault_id, "Vault connection healthy");
        }
        Ok(())
    }

    fn invalidate_cache(&self) {
        for client in self.unique_clients() {
            client.invalidate_cache();
        }
    }

    fn shutdown(&self) {
        for client in self.unique_clients() {
            client.shutdown();
        }
    }

    fn cache_size(&self) -> usize {
        self.unique_clients().iter().map(|client| client.cache_size()).sum()
    }
}
