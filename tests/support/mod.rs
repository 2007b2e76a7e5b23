//! Shared fixtures for the integration suites
//!
//! Provides:
//! - ephemeral certificates minted with rcgen
//! - a wiremock-backed fake Vault speaking the PKI HTTP API
//! - certificate builders for aggregator tests

#![allow(dead_code)]

use std::time::Duration;

use chrono::{TimeZone, Utc};
use pkiview::config::{CacheSettings, SecretString, VaultInstance};
use pkiview::Certificate;
use rcgen::{CertificateParams, DnType, KeyPair};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const READ_TOKEN: &str = "s.read-token";
pub const WRITE_TOKEN: &str = "s.write-token";

/// Self-signed PEM certificate for `common_name` with one DNS SAN.
pub fn pem_for(common_name: &str) -> String {
    let mut params =
        CertificateParams::new(vec![format!("{}.example.com", common_name)]).expect("params");
    params.distinguished_name.push(DnType::CommonName, common_name);
    let key = KeyPair::generate().expect("key pair");
    params.self_signed(&key).expect("self-signed").pem()
}

/// Summary record with fixed timestamps.
pub fn certificate(id: &str, common_name: &str) -> Certificate {
    Certificate {
        id: id.to_string(),
        common_name: common_name.to_string(),
        sans: vec![format!("{}.example.com", common_name)],
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        expires_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        revoked: false,
    }
}

pub fn cache_settings() -> CacheSettings {
    CacheSettings { ttl: Duration::from_secs(60), cleanup_interval: Duration::from_secs(60) }
}

/// A fake Vault server with helpers to mount PKI responses.
pub struct FakeVault {
    pub server: MockServer,
}

impl FakeVault {
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn instance(&self, id: &str, mounts: &[&str]) -> VaultInstance {
        VaultInstance {
            id: id.to_string(),
            address: self.uri(),
            token: SecretString::new(READ_TOKEN),
            pki_mount: mounts.first().copied().unwrap_or("pki").to_string(),
            pki_mounts: mounts.iter().map(|m| m.to_string()).collect(),
            display_name: id.to_string(),
            ..Default::default()
        }
    }

    pub async fn serials(&self, mount: &str, serials: &[&str]) {
        self.list(&format!("/v1/{}/certs", mount), serials).await;
    }

    pub async fn revoked(&self, mount: &str, serials: &[&str]) {
        self.list(&format!("/v1/{}/certs/revoked", mount), serials).await;
    }

    async fn list(&self, list_path: &str, keys: &[&str]) {
        Mock::given(method("GET"))
            .and(path(list_path))
            .and(query_param("list", "true"))
            .and(header("X-Vault-Token", READ_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "keys": keys }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn certificate(&self, mount: &str, serial: &str, pem: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v1/{}/cert/{}", mount, serial)))
            .and(header("X-Vault-Token", READ_TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "certificate": pem }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn health(&self, initialized: bool, sealed: bool) {
        Mock::given(method("GET"))
            .and(path("/v1/sys/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "initialized": initialized,
                "sealed": sealed,
                "standby": false,
                "version": "1.15.0"
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer token lookups for the read token with 200, or 403 when rejected.
    pub async fn token(&self, accepted: bool) {
        let template = if accepted {
            ResponseTemplate::new(200).set_body_json(json!({ "data": { "policies": ["read"] } }))
        } else {
            ResponseTemplate::new(403).set_body_json(json!({ "errors": ["permission denied"] }))
        };
        Mock::given(method("GET"))
            .and(path("/v1/auth/token/lookup-self"))
            .and(header("X-Vault-Token", READ_TOKEN))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    /// Answer every request with `status` and a Vault error body.
    pub async fn fail_all(&self, status: u16) {
        Mock::given(wiremock::matchers::any())
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "errors": ["permission denied"]
            })))
            .mount(&self.server)
            .await;
    }
}
