//! Vault client registry
//!
//! Builds one [`VaultCertificateClient`] per configured instance and the
//! capability handle the rest of the application uses: the disabled
//! client when nothing is configured, the aggregator otherwise.

use super::client::CertificateClient;
use super::disabled::DisabledClient;
use super::multi::MultiVaultClient;
use super::real::VaultCertificateClient;
use crate::config::AppConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of configured vaults
pub struct VaultRegistry {
    vaults: HashMap<String, Arc<VaultCertificateClient>>,
    display_names: HashMap<String, String>,
    aggregator: Option<Arc<MultiVaultClient>>,
    client: Arc<dyn CertificateClient>,
}

impl std::fmt::Debug for VaultRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultRegistry")
            .field("vaults", &self.vaults.keys().collect::<Vec<_>>())
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

impl VaultRegistry {
    /// Build clients for every configured vault.
    ///
    /// A vault whose client cannot be built (bad CA bundle, unparsable
    /// address) stays registered without a client, so it is reported as
    /// missing instead of silently disappearing from diagnostics.
    pub fn from_config(config: &AppConfig) -> Self {
        if config.vaults.is_empty() {
            info!("No vault configured, certificate catalog disabled");
            return Self {
                vaults: HashMap::new(),
                display_names: HashMap::new(),
                aggregator: None,
                client: Arc::new(DisabledClient::new()),
            };
        }

        let mut vaults = HashMap::new();
        let mut display_names = HashMap::new();
        let mut clients: HashMap<String, Option<Arc<dyn CertificateClient>>> = HashMap::new();

        for instance in &config.vaults {
            display_names.insert(instance.id.clone(), instance.display_name.clone());
            let built = VaultCertificateClient::from_instance(
                instance,
                &config.cache,
                config.request_timeout,
            );
            match built {
                Ok(client) => {
                    let client = Arc::new(client);
                    info!(
                        vault_id = %instance.id,
                        address = %instance.address,
                        mounts = ?instance.pki_mounts,
                        "Registered vault"
                    );
                    let shared: Arc<dyn CertificateClient> = client.clone();
                    clients.insert(instance.id.clone(), Some(shared));
                    vaults.insert(instance.id.clone(), client);
                }
                Err(e) => {
                    warn!(vault_id = %instance.id, error = %e, "Failed to initialize vault client");
                    clients.insert(instance.id.clone(), None);
                }
            }
        }

        let aggregator = Arc::new(MultiVaultClient::new(config.vault_ids(), clients));
        Self {
            vaults,
            display_names,
            aggregator: Some(aggregator.clone()),
            client: aggregator,
        }
    }

    /// The capability handle: disabled client or aggregator
    pub fn client(&self) -> Arc<dyn CertificateClient> {
        Arc::clone(&self.client)
    }

    /// The aggregator, absent when no vault is configured
    pub fn aggregator(&self) -> Option<Arc<MultiVaultClient>> {
        self.aggregator.clone()
    }

    /// The single-vault client for `vault_id`, if it was built
    pub fn vault(&self, vault_id: &str) -> Option<Arc<VaultCertificateClient>> {
        self.vaults.get(vault_id).cloned()
    }

    pub fn display_name(&self, vault_id: &str) -> Option<&str> {
        self.display_names.get(vault_id).map(String::as_str)
    }

    /// Vault ids in enumeration order
    pub fn vault_ids(&self) -> Vec<String> {
        self.aggregator
            .as_ref()
            .map(|aggregator| aggregator.vault_ids().to_vec())
            .unwrap_or_default()
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}

/// Build the capability handle for a configuration.
pub fn build_client(config: &AppConfig) -> Arc<dyn CertificateClient> {
    VaultRegistry::from_config(config).client()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SecretString, VaultInstance};

    fn vault(id: &str, address: &str) -> VaultInstance {
        VaultInstance {
            id: id.to_string(),
            address: address.to_string(),
            token: SecretString::new("s.read"),
            pki_mount: "pki".to_string(),
            pki_mounts: vec!["pki".to_string()],
            display_name: id.to_uppercase(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_config_is_disabled() {
        let registry = VaultRegistry::from_config(&AppConfig::default());
        assert!(registry.aggregator().is_none());
        assert!(registry.vault_ids().is_empty());
        let client = registry.client();
        assert_eq!(client.list_certificates().await, Ok(Vec::new()));
        assert!(client.check_connection().await.unwrap_err().is_not_configured());
    }

    #[tokio::test]
    async fn test_vaults_registered_in_config_order() {
        let config = AppConfig {
            vaults: vec![vault("b", "https://b:8200"), vault("a", "https://a:8200")],
            ..Default::default()
        };
        let registry = VaultRegistry::from_config(&config);
        assert_eq!(registry.vault_ids(), vec!["b", "a"]);
        assert!(registry.vault("a").is_some());
        assert_eq!(registry.display_name("b"), Some("B"));
        registry.shutdown();
        assert!(registry.vault("a").unwrap().is_shut_down());
    }

    #[tokio::test]
    async fn test_unbuildable_vault_reported_missing() {
        let mut broken = vault("broken", "https://broken:8200");
        broken.tls_ca_cert = Some("/nonexistent/ca.pem".to_string());
        let config = AppConfig {
            vaults: vec![broken, vault("ok", "https://ok:8200")],
            ..Default::default()
        };
        let registry = VaultRegistry::from_config(&config);
        assert!(registry.vault("broken").is_none());
        assert_eq!(registry.vault_ids(), vec!["broken", "ok"]);

        let error = registry
            .client()
            .get_certificate_pem("broken|pki:01")
            .await
            .unwrap_err();
        assert!(matches!(error, crate::errors::CatalogError::MissingClient { .. }));
        registry.shutdown();
    }
}
