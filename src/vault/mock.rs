//! In-memory test doubles
//!
//! [`MockPkiConnection`] stands in for a Vault server behind a
//! [`VaultCertificateClient`](super::VaultCertificateClient);
//! [`MockCertificateClient`] stands in for a whole certificate client
//! behind the aggregator. Both count calls and can be scripted to fail.
//!
//! # Example
//!
//! ```rust,ignore
//! let mock = Arc::new(MockCertificateClient::new().with_list_error(CatalogError::Sealed));
//! assert!(mock.list_certificates().await.is_err());
//! assert_eq!(mock.list_calls(), 1);
//! ```

use super::client::CertificateClient;
use super::connection::{HealthStatus, PkiConnection};
use crate::certs::{Certificate, DetailedCertificate, PemResponse};
use crate::errors::{CatalogError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct PkiState {
    certificates: BTreeMap<String, BTreeMap<String, String>>,
    revoked: HashMap<String, HashSet<String>>,
    failing_mounts: HashMap<String, CatalogError>,
    health: Option<std::result::Result<HealthStatus, CatalogError>>,
    token_error: Option<CatalogError>,
    revocations: Vec<(String, String, String)>,
    crls: HashMap<String, String>,
    rotations: Vec<String>,
}

/// Scriptable in-memory Vault PKI backend.
#[derive(Default)]
pub struct MockPkiConnection {
    state: Mutex<PkiState>,
    list_calls: AtomicUsize,
    read_calls: AtomicUsize,
    revoked_calls: AtomicUsize,
}

impl MockPkiConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a certificate record; `pem` may be arbitrary text to model corrupt records.
    pub fn insert_certificate(&self, mount: &str, serial: &str, pem: impl Into<String>) {
        lock(&self.state)
            .certificates
            .entry(mount.to_string())
            .or_default()
            .insert(serial.to_string(), pem.into());
    }

    pub fn mark_revoked(&self, mount: &str, serial: &str) {
        lock(&self.state)
            .revoked
            .entry(mount.to_string())
            .or_default()
            .insert(serial.to_string());
    }

    /// Make every operation on `mount` fail with `error`.
    pub fn fail_mount(&self, mount: &str, error: CatalogError) {
        lock(&self.state).failing_mounts.insert(mount.to_string(), error);
    }

    pub fn set_health(&self, health: std::result::Result<HealthStatus, CatalogError>) {
        lock(&self.state).health = Some(health);
    }

    /// Make the read token lookup fail with `error`.
    pub fn reject_token(&self, error: CatalogError) {
        lock(&self.state).token_error = Some(error);
    }

    pub fn set_crl(&self, mount: &str, crl: impl Into<String>) {
        lock(&self.state).crls.insert(mount.to_string(), crl.into());
    }

    /// `(mount, serial, write_token)` of every accepted revocation
    pub fn revocations(&self) -> Vec<(String, String, String)> {
        lock(&self.state).revocations.clone()
    }

    pub fn rotations(&self) -> Vec<String> {
        lock(&self.state).rotations.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn revoked_calls(&self) -> usize {
        self.revoked_calls.load(Ordering::SeqCst)
    }

    fn check_mount(&self, mount: &str) -> Result<()> {
        match lock(&self.state).failing_mounts.get(mount) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PkiConnection for MockPkiConnection {
    async fn list_serials(&self, mount: &str) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check_mount(mount)?;
        Ok(lock(&self.state)
            .certificates
            .get(mount)
            .map(|records| records.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_revoked(&self, mount: &str) -> Result<Vec<String>> {
        self.revoked_calls.fetch_add(1, Ordering::SeqCst);
        self.check_mount(mount)?;
        Ok(lock(&self.state)
            .revoked
            .get(mount)
            .map(|serials| serials.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn read_certificate(&self, mount: &str, serial: &str) -> Result<Option<String>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        self.check_mount(mount)?;
        Ok(lock(&self.state)
            .certificates
            .get(mount)
            .and_then(|records| records.get(serial).cloned()))
    }

    async fn revoke(&self, mount: &str, serial: &str, write_token: &str) -> Result<()> {
        self.check_mount(mount)?;
        let mut state = lock(&self.state);
        let known = state
            .certificates
            .get(mount)
            .is_some_and(|records| records.contains_key(serial));
        if !known {
            return Err(CatalogError::not_found(mount, serial));
        }
        state
            .revoked
            .entry(mount.to_string())
            .or_default()
            .insert(serial.to_string());
        state
            .revocations
            .push((mount.to_string(), serial.to_string(), write_token.to_string()));
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        match lock(&self.state).health.clone() {
            Some(health) => health,
            None => Ok(HealthStatus { initialized: true, sealed: false }),
        }
    }

    async fn lookup_self(&self) -> Result<()> {
        match lock(&self.state).token_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn read_crl(&self, mount: &str) -> Result<String> {
        self.check_mount(mount)?;
        Ok(lock(&self.state).crls.get(mount).cloned().unwrap_or_default())
    }

    async fn rotate_crl(&self, mount: &str) -> Result<()> {
        self.check_mount(mount)?;
        lock(&self.state).rotations.push(mount.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct ClientState {
    certificates: Vec<Certificate>,
    details: HashMap<String, DetailedCertificate>,
    list_error: Option<CatalogError>,
    connection_error: Option<CatalogError>,
    list_delay: Option<Duration>,
    requested_ids: Vec<String>,
    revocations: Vec<(String, String)>,
}

/// Scriptable certificate client with call counters.
#[derive(Default)]
pub struct MockCertificateClient {
    state: Mutex<ClientState>,
    cache_entries: AtomicUsize,
    list_calls: AtomicUsize,
    check_calls: AtomicUsize,
    invalidate_calls: AtomicUsize,
    shutdown_calls: AtomicUsize,
}

impl MockCertificateClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_certificates(self, certificates: Vec<Certificate>) -> Self {
        lock(&self.state).certificates = certificates;
        self
    }

    /// Answer detail lookups for `detail.certificate.id` with `detail`
    pub fn with_detail(self, detail: DetailedCertificate) -> Self {
        lock(&self.state)
            .details
            .insert(detail.certificate.id.clone(), detail);
        self
    }

    pub fn with_list_error(self, error: CatalogError) -> Self {
        lock(&self.state).list_error = Some(error);
        self
    }

    pub fn with_connection_error(self, error: CatalogError) -> Self {
        lock(&self.state).connection_error = Some(error);
        self
    }

    /// Sleep before answering `list_certificates`
    pub fn with_list_delay(self, delay: Duration) -> Self {
        lock(&self.state).list_delay = Some(delay);
        self
    }

    pub fn with_cache_size(self, entries: usize) -> Self {
        self.cache_entries.store(entries, Ordering::SeqCst);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn invalidate_calls(&self) -> usize {
        self.invalidate_calls.load(Ordering::SeqCst)
    }

    pub fn shutdown_calls(&self) -> usize {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Ids passed to detail, PEM and revoke calls, in call order
    pub fn requested_ids(&self) -> Vec<String> {
        lock(&self.state).requested_ids.clone()
    }

    /// `(id, write_token)` of every revocation
    pub fn revocations(&self) -> Vec<(String, String)> {
        lock(&self.state).revocations.clone()
    }

    fn lookup(&self, id: &str) -> Result<DetailedCertificate> {
        let mut state = lock(&self.state);
        state.requested_ids.push(id.to_string());
        if let Some(detail) = state.details.get(id) {
            return Ok(detail.clone());
        }
        let certificate = state
            .certificates
            .iter()
            .find(|certificate| certificate.id == id)
            .cloned();
        match certificate {
            Some(certificate) => {
                let serial = id.split_once(':').map_or(id, |(_, serial)| serial);
                Ok(DetailedCertificate {
                    serial_number: serial.to_string(),
                    certificate,
                    ..Default::default()
                })
            }
            None => {
                let (mount, serial) = id.split_once(':').unwrap_or(("", id));
                Err(CatalogError::not_found(mount, serial))
            }
        }
    }
}

#[async_trait]
impl CertificateClient for MockCertificateClient {
    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = lock(&self.state).list_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = lock(&self.state);
        match &state.list_error {
            Some(error) => Err(error.clone()),
            None => Ok(state.certificates.clone()),
        }
    }

    async fn get_certificate_details(&self, id: &str) -> Result<DetailedCertificate> {
        self.lookup(id)
    }

    async fn get_certificate_pem(&self, id: &str) -> Result<PemResponse> {
        let detail = self.lookup(id)?;
        Ok(PemResponse {
            serial_number: detail.serial_number,
            pem: detail.pem,
        })
    }

    async fn revoke_certificate(&self, id: &str, write_token: &str) -> Result<()> {
        if write_token.trim().is_empty() {
            return Err(CatalogError::MissingWriteToken);
        }
        let mut state = lock(&self.state);
        state.requested_ids.push(id.to_string());
        state.revocations.push((id.to_string(), write_token.to_string()));
        Ok(())
    }

    async fn check_connection(&self) -> Result<()> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        match &lock(&self.state).connection_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn invalidate_cache(&self) {
        self.invalidate_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn shutdown(&self) {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn cache_size(&self) -> usize {
        self.cache_entries.load(Ordering::SeqCst)
    }
}
