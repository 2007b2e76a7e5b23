//! # Configuration Management
//!
//! Application settings, Vault instance discovery and token handling.
//!
//! Every loader reads variables through an [`EnvLookup`] so callers (and
//! tests) can supply their own source instead of the process environment.

mod secret;
mod settings;
mod vaults;

pub use secret::SecretString;
pub use settings::{
    AppConfig, CacheSettings, Environment, LogFormat, LoggingConfig, SettingsFile,
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_REQUEST_TIMEOUT,
};
pub use vaults::{
    derive_vault_id, legacy_instance, merge_vault_instances, normalize_vault_instances,
    parse_vault_addrs, VaultInstance, DEFAULT_PKI_MOUNT, LEGACY_VAULT_ID,
};

/// Variable lookup used by all configuration loaders.
pub type EnvLookup<'a> = dyn Fn(&str) -> Option<String> + 'a;

/// Returns the trimmed value of `name`, treating blank values as unset.
pub(crate) fn lookup_trimmed(lookup: &EnvLookup, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn lookup_bool(lookup: &EnvLookup, name: &str) -> Option<bool> {
    lookup_trimmed(lookup, name).map(|value| {
        matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
