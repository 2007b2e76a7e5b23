//! # Vault Instances
//!
//! Collects the configured Vault backends from the settings file, the
//! `VAULT_ADDRS` environment variable and the legacy single-vault
//! variables, then normalizes them into a validated, ordered list.

use super::{lookup_bool, lookup_trimmed, EnvLookup, SecretString};
use crate::errors::{CatalogError, Result};
use crate::vault::COMPOSITE_SEPARATOR;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

/// Mount used when an instance names none.
pub const DEFAULT_PKI_MOUNT: &str = "pki";

/// Identifier given to the instance built from the legacy variables.
pub const LEGACY_VAULT_ID: &str = "default";

/// One configured Vault server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, Default)]
pub struct VaultInstance {
    #[serde(default)]
    #[validate(length(min = 1, message = "vault id is empty"))]
    pub id: String,

    #[serde(default)]
    #[validate(url(message = "invalid vault address"))]
    pub address: String,

    #[serde(default)]
    pub token: SecretString,

    /// Single-mount shorthand; folded into `pki_mounts` during normalization.
    #[serde(default)]
    pub pki_mount: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "at least one PKI mount is required"))]
    pub pki_mounts: Vec<String>,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub tls_insecure: bool,

    /// Base64-encoded PEM bundle of extra root certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert_base64: Option<String>,

    /// Path to a PEM bundle of extra root certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl VaultInstance {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// TLS parameters shared by every environment-defined instance.
#[derive(Debug, Clone, Default)]
struct EnvTls {
    insecure: bool,
    ca_cert_base64: Option<String>,
    ca_cert: Option<String>,
}

impl EnvTls {
    fn from_lookup(lookup: &EnvLookup) -> Self {
        Self {
            insecure: lookup_bool(lookup, "VAULT_TLS_INSECURE")
                .or_else(|| lookup_bool(lookup, "VAULT_SKIP_VERIFY"))
                .unwrap_or(false),
            ca_cert_base64: lookup_trimmed(lookup, "VAULT_TLS_CA_CERT_BASE64")
                .or_else(|| lookup_trimmed(lookup, "VAULT_CACERT_BYTES")),
            ca_cert: lookup_trimmed(lookup, "VAULT_TLS_CA_CERT")
                .or_else(|| lookup_trimmed(lookup, "VAULT_CACERT")),
        }
    }

    fn apply(&self, instance: &mut VaultInstance) {
        instance.tls_insecure = self.insecure;
        instance.tls_ca_cert_base64 = self.ca_cert_base64.clone();
        instance.tls_ca_cert = self.ca_cert.clone();
    }
}

/// Parses `VAULT_ADDRS`: comma-separated `[id@]address[#token[#mount]]`.
///
/// Entries without an address or a token (including the `VAULT_READ_TOKEN`
/// default) are skipped, as are entries with more than three `#` parts.
pub fn parse_vault_addrs(lookup: &EnvLookup) -> Vec<VaultInstance> {
    let Some(raw) = lookup_trimmed(lookup, "VAULT_ADDRS") else {
        return Vec::new();
    };
    let tls = EnvTls::from_lookup(lookup);
    let default_token = lookup_trimmed(lookup, "VAULT_READ_TOKEN").unwrap_or_default();

    raw.split(',')
        .enumerate()
        .filter_map(|(index, entry)| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            parse_vault_addrs_entry(entry, index, &default_token, &tls)
        })
        .collect()
}

fn parse_vault_addrs_entry(
    entry: &str,
    index: usize,
    default_token: &str,
    tls: &EnvTls,
) -> Option<VaultInstance> {
    let (id, rest) = match entry.find('@') {
        Some(at) if at > 0 => (entry[..at].to_string(), &entry[at + 1..]),
        _ => (String::new(), entry),
    };

    let parts: Vec<&str> = rest.split('#').collect();
    let (address, token, mount) = match parts.as_slice() {
        [address] => (*address, default_token, DEFAULT_PKI_MOUNT),
        [address, token] => (*address, *token, DEFAULT_PKI_MOUNT),
        [address, token, mount] => (*address, *token, *mount),
        _ => return None,
    };
    if address.is_empty() || token.is_empty() {
        return None;
    }

    let id = if id.is_empty() {
        format!("vault-{}", index + 1)
    } else {
        id
    };

    let mut instance = VaultInstance {
        id,
        address: address.to_string(),
        token: SecretString::new(token),
        pki_mount: mount.to_string(),
        pki_mounts: vec![mount.to_string()],
        ..Default::default()
    };
    tls.apply(&mut instance);
    Some(instance)
}

/// Builds the single `default` instance from `VAULT_ADDR`, `VAULT_READ_TOKEN`
/// and `VAULT_PKI_MOUNTS` / `VAULT_PKI_MOUNT`.
pub fn legacy_instance(lookup: &EnvLookup) -> Option<VaultInstance> {
    let address = lookup_trimmed(lookup, "VAULT_ADDR")?;
    let token = lookup_trimmed(lookup, "VAULT_READ_TOKEN")?;

    let mut mounts: Vec<String> = lookup_trimmed(lookup, "VAULT_PKI_MOUNTS")
        .or_else(|| lookup_trimmed(lookup, "VAULT_PKI_MOUNT"))
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|mount| !mount.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if mounts.is_empty() {
        mounts.push(DEFAULT_PKI_MOUNT.to_string());
    }

    let mut instance = VaultInstance {
        id: LEGACY_VAULT_ID.to_string(),
        address,
        token: SecretString::new(token),
        pki_mount: mounts[0].clone(),
        pki_mounts: mounts,
        display_name: LEGACY_VAULT_ID.to_string(),
        ..Default::default()
    };
    EnvTls::from_lookup(lookup).apply(&mut instance);
    Some(instance)
}

/// Keeps every `primary` instance, then appends `secondary` instances
/// whose id is not already taken. Instances without an id are dropped.
pub fn merge_vault_instances(
    primary: Vec<VaultInstance>,
    secondary: Vec<VaultInstance>,
) -> Vec<VaultInstance> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(primary.len() + secondary.len());

    for instance in primary {
        if instance.id.is_empty() {
            continue;
        }
        seen.insert(instance.id.clone());
        merged.push(instance);
    }
    for instance in secondary {
        if instance.id.is_empty() || seen.contains(&instance.id) {
            continue;
        }
        merged.push(instance);
    }
    merged
}

/// Drops disabled instances, normalizes the rest and rejects duplicate ids.
pub fn normalize_vault_instances(instances: Vec<VaultInstance>) -> Result<Vec<VaultInstance>> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(instances.len());

    for (index, instance) in instances.into_iter().enumerate() {
        if !instance.is_enabled() {
            continue;
        }
        let instance = normalize_vault_instance(instance)
            .map_err(|e| CatalogError::config(format!("vault {}: {}", index, e)))?;
        if !seen.insert(instance.id.clone()) {
            return Err(CatalogError::config(format!(
                "duplicate vault id: {}",
                instance.id
            )));
        }
        normalized.push(instance);
    }
    Ok(normalized)
}

fn normalize_vault_instance(instance: VaultInstance) -> Result<VaultInstance> {
    let address = instance.address.trim().to_string();
    if address.is_empty() {
        return Err(CatalogError::config("vault address is empty"));
    }

    let mut id = instance.id.trim().to_string();
    if id.is_empty() {
        id = derive_vault_id(&address);
    }
    // Composite certificate ids are split on the first separator.
    if id.contains(COMPOSITE_SEPARATOR) {
        return Err(CatalogError::config(format!(
            "vault id '{}' must not contain '{}'",
            id, COMPOSITE_SEPARATOR
        )));
    }

    let token = instance.token.trimmed();
    if token.is_blank() {
        return Err(CatalogError::config("vault token is empty"));
    }

    let mut pki_mounts: Vec<String> = instance
        .pki_mounts
        .iter()
        .map(|mount| mount.trim().to_string())
        .filter(|mount| !mount.is_empty())
        .collect();
    let pki_mount = instance.pki_mount.trim().to_string();
    if pki_mounts.is_empty() && !pki_mount.is_empty() {
        pki_mounts.push(pki_mount.clone());
    }
    if pki_mounts.is_empty() {
        pki_mounts.push(DEFAULT_PKI_MOUNT.to_string());
    }
    let pki_mount = if pki_mount.is_empty() {
        pki_mounts[0].clone()
    } else {
        pki_mount
    };

    let display_name = match instance.display_name.trim() {
        "" => id.clone(),
        name => name.to_string(),
    };

    let normalized = VaultInstance {
        id,
        address,
        token,
        pki_mount,
        pki_mounts,
        display_name,
        tls_insecure: instance.tls_insecure,
        tls_ca_cert_base64: non_blank(instance.tls_ca_cert_base64.as_deref()),
        tls_ca_cert: non_blank(instance.tls_ca_cert.as_deref()),
        enabled: Some(true),
    };
    normalized.validate()?;
    Ok(normalized)
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Derives an identifier from a server address:
/// `https://vault.example.com:8200` becomes `vault-example-com-8200`.
pub fn derive_vault_id(address: &str) -> String {
    let address = address.trim();
    let address = address
        .strip_prefix("https://")
        .or_else(|| address.strip_prefix("http://"))
        .unwrap_or(address);
    let address = address.strip_suffix('/').unwrap_or(address);
    address
        .replace(['/', ':', '.'], "-")
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn instance(id: &str, address: &str) -> VaultInstance {
        VaultInstance {
            id: id.to_string(),
            address: address.to_string(),
            token: SecretString::new("t"),
            ..Default::default()
        }
    }

    #[test]
    fn test_derive_vault_id() {
        assert_eq!(
            derive_vault_id("https://vault.example.com:8200"),
            "vault-example-com-8200"
        );
        assert_eq!(derive_vault_id("http://10.0.0.1:8200/"), "10-0-0-1-8200");
        assert_eq!(derive_vault_id("  vault.local  "), "vault-local");
    }

    #[test]
    fn test_parse_vault_addrs_all_forms() {
        let lookup = env(&[
            (
                "VAULT_ADDRS",
                "prod@https://a:8200#tok-a#pki_int, https://b:8200#tok-b ,https://c:8200",
            ),
            ("VAULT_READ_TOKEN", "shared"),
        ]);
        let instances = parse_vault_addrs(&lookup);
        assert_eq!(instances.len(), 3);

        assert_eq!(instances[0].id, "prod");
        assert_eq!(instances[0].address, "https://a:8200");
        assert_eq!(instances[0].token.expose_secret(), "tok-a");
        assert_eq!(instances[0].pki_mounts, vec!["pki_int"]);

        assert_eq!(instances[1].id, "vault-2");
        assert_eq!(instances[1].token.expose_secret(), "tok-b");
        assert_eq!(instances[1].pki_mounts, vec!["pki"]);

        assert_eq!(instances[2].id, "vault-3");
        assert_eq!(instances[2].token.expose_secret(), "shared");
    }

    #[test]
    fn test_parse_vault_addrs_skips_incomplete_entries() {
        let lookup = env(&[("VAULT_ADDRS", "https://a:8200,https://b#t#m#extra,,x@#tok")]);
        assert!(parse_vault_addrs(&lookup).is_empty());
    }

    #[test]
    fn test_parse_vault_addrs_applies_tls_env() {
        let lookup = env(&[
            ("VAULT_ADDRS", "https://a:8200#t"),
            ("VAULT_SKIP_VERIFY", "true"),
            ("VAULT_CACERT", "/etc/ca.pem"),
        ]);
        let instances = parse_vault_addrs(&lookup);
        assert!(instances[0].tls_insecure);
        assert_eq!(instances[0].tls_ca_cert.as_deref(), Some("/etc/ca.pem"));
        assert_eq!(instances[0].tls_ca_cert_base64, None);
    }

    #[test]
    fn test_legacy_instance() {
        let lookup = env(&[
            ("VAULT_ADDR", "https://vault:8200"),
            ("VAULT_READ_TOKEN", "r"),
            ("VAULT_PKI_MOUNTS", "pki, pki_int ,"),
        ]);
        let legacy = legacy_instance(&lookup).unwrap();
        assert_eq!(legacy.id, "default");
        assert_eq!(legacy.display_name, "default");
        assert_eq!(legacy.pki_mounts, vec!["pki", "pki_int"]);
        assert_eq!(legacy.pki_mount, "pki");

        assert!(legacy_instance(&env(&[("VAULT_ADDR", "https://vault:8200")])).is_none());
    }

    #[test]
    fn test_merge_prefers_primary() {
        let primary = vec![instance("a", "https://primary"), instance("", "https://x")];
        let secondary = vec![instance("a", "https://secondary"), instance("b", "https://b")];
        let merged = merge_vault_instances(primary, secondary);
        let ids: Vec<_> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(merged[0].address, "https://primary");
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let mut raw = instance("  ", " https://vault.example.com:8200 ");
        raw.token = SecretString::new("  tok ");
        let normalized = normalize_vault_instances(vec![raw]).unwrap();
        let vault = &normalized[0];
        assert_eq!(vault.id, "vault-example-com-8200");
        assert_eq!(vault.address, "https://vault.example.com:8200");
        assert_eq!(vault.token.expose_secret(), "tok");
        assert_eq!(vault.pki_mounts, vec!["pki"]);
        assert_eq!(vault.pki_mount, "pki");
        assert_eq!(vault.display_name, vault.id);
        assert_eq!(vault.enabled, Some(true));
    }

    #[test]
    fn test_normalize_folds_single_mount() {
        let mut raw = instance("a", "https://a");
        raw.pki_mount = "pki_int".to_string();
        let normalized = normalize_vault_instances(vec![raw]).unwrap();
        assert_eq!(normalized[0].pki_mounts, vec!["pki_int"]);
    }

    #[test]
    fn test_normalize_drops_disabled() {
        let mut disabled = instance("a", "https://a");
        disabled.enabled = Some(false);
        let normalized =
            normalize_vault_instances(vec![disabled, instance("b", "https://b")]).unwrap();
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].id, "b");
    }

    #[test]
    fn test_normalize_rejects_invalid() {
        let duplicate = normalize_vault_instances(vec![
            instance("a", "https://a"),
            instance("a", "https://b"),
        ]);
        assert!(matches!(duplicate, Err(CatalogError::Config { .. })));

        let mut no_token = instance("a", "https://a");
        no_token.token = SecretString::new(" ");
        assert!(normalize_vault_instances(vec![no_token]).is_err());

        assert!(normalize_vault_instances(vec![instance("a", "")]).is_err());
        assert!(normalize_vault_instances(vec![instance("a", "not a url")]).is_err());
    }

    #[test]
    fn test_normalize_rejects_separator_in_id() {
        let result = normalize_vault_instances(vec![instance("team|a", "https://a")]);
        assert!(matches!(
            result,
            Err(CatalogError::Config { message }) if message.contains("team|a")
        ));

        let lookup = env(&[("VAULT_ADDRS", "team|a@https://a:8200#t")]);
        assert!(normalize_vault_instances(parse_vault_addrs(&lookup)).is_err());
    }

    #[test]
    fn test_settings_json_shape() {
        let json = r#"{
            "id": "prod",
            "address": "https://vault:8200",
            "token": "s.xyz",
            "pki_mounts": ["pki", "pki_int"],
            "display_name": "Production",
            "tls_insecure": true,
            "tls_server_name": "ignored"
        }"#;
        let parsed: VaultInstance = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "prod");
        assert_eq!(parsed.token.expose_secret(), "s.xyz");
        assert!(parsed.is_enabled());
        assert!(parsed.tls_insecure);
    }
}
