//! Vault PKI connection
//!
//! The protocol the certificate clients speak to one Vault server: list
//! serials, list revoked serials, read one certificate, revoke, check
//! health, verify the read token and manage the CRL. [`HttpPkiConnection`]
//! implements it over the Vault HTTP API.

use crate::config::{SecretString, VaultInstance};
use crate::errors::{CatalogError, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Initialization and seal state reported by `sys/health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub initialized: bool,
    pub sealed: bool,
}

/// Operations a certificate client needs from one Vault server.
#[async_trait]
pub trait PkiConnection: Send + Sync {
    /// Serials of every certificate issued under `mount`.
    async fn list_serials(&self, mount: &str) -> Result<Vec<String>>;

    /// Serials of revoked certificates under `mount`.
    async fn list_revoked(&self, mount: &str) -> Result<Vec<String>>;

    /// PEM text of one certificate, `None` when the serial does not exist.
    async fn read_certificate(&self, mount: &str, serial: &str) -> Result<Option<String>>;

    /// Revoke using a caller-supplied write token instead of the read token.
    async fn revoke(&self, mount: &str, serial: &str, write_token: &str) -> Result<()>;

    async fn health(&self) -> Result<HealthStatus>;

    /// Succeeds when the read token is accepted by the server.
    async fn lookup_self(&self) -> Result<()>;

    /// Current CRL of `mount` in PEM form.
    async fn read_crl(&self, mount: &str) -> Result<String>;

    async fn rotate_crl(&self, mount: &str) -> Result<()>;
}

/// TLS parameters for the HTTP connection
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip server certificate verification
    pub insecure: bool,
    /// Extra trusted roots, PEM bundle
    pub ca_pem: Option<Vec<u8>>,
}

impl TlsOptions {
    /// Resolve TLS options from an instance, reading the CA file or
    /// decoding the base64 bundle. The file path wins when both are set.
    pub fn from_instance(instance: &VaultInstance) -> Result<Self> {
        let ca_pem = if let Some(path) = &instance.tls_ca_cert {
            Some(std::fs::read(path).map_err(|e| {
                CatalogError::config(format!("cannot read CA certificate {}: {}", path, e))
            })?)
        } else if let Some(encoded) = &instance.tls_ca_cert_base64 {
            Some(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| {
                        CatalogError::config(format!("invalid base64 CA certificate: {}", e))
                    })?,
            )
        } else {
            None
        };

        Ok(Self { insecure: instance.tls_insecure, ca_pem })
    }
}

#[derive(Deserialize)]
struct VaultResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<String>,
}

#[derive(Deserialize)]
struct CertificateData {
    #[serde(default)]
    certificate: String,
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
}

/// [`PkiConnection`] over the Vault HTTP API.
pub struct HttpPkiConnection {
    client: Client,
    base: Url,
    token: SecretString,
}

impl std::fmt::Debug for HttpPkiConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPkiConnection")
            .field("base", &self.base.as_str())
            .field("token", &self.token)
            .finish()
    }
}

impl HttpPkiConnection {
    pub fn new(
        address: &str,
        token: SecretString,
        tls: &TlsOptions,
        timeout: Duration,
    ) -> Result<Self> {
        let base = Url::parse(address.trim()).map_err(|e| {
            CatalogError::config(format!("invalid vault address '{}': {}", address, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(CatalogError::config(format!(
                "invalid vault address '{}': not a hierarchical URL",
                address
            )));
        }

        let mut builder = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(tls.insecure);
        if let Some(pem) = &tls.ca_pem {
            let roots = reqwest::Certificate::from_pem_bundle(pem).map_err(|e| {
                CatalogError::config(format!("invalid CA certificate bundle: {}", e))
            })?;
            for root in roots {
                builder = builder.add_root_certificate(root);
            }
        }
        let client = builder
            .build()
            .map_err(|e| CatalogError::config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base, token })
    }

    pub fn from_instance(instance: &VaultInstance, timeout: Duration) -> Result<Self> {
        let tls = TlsOptions::from_instance(instance)?;
        Self::new(&instance.address, instance.token.clone(), &tls, timeout)
    }

    /// URL of `segments` below `/v1`.
    ///
    /// Each segment is percent-encoded on its own, so a `/` inside a serial
    /// stays inside that segment. Empty, `.` and `..` segments are rejected.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if segments
            .iter()
            .any(|segment| segment.is_empty() || *segment == "." || *segment == "..")
        {
            return Err(CatalogError::invalid_id(segments.join("/")));
        }

        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::config(format!("vault address {} has no path", self.base)))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(TOKEN_HEADER, self.token.expose_secret())
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| CatalogError::connection(format!("request to {} failed: {}", url, e)))
    }

    async fn list_keys(&self, segments: &[&str]) -> Result<Vec<String>> {
        let url = self.endpoint(segments)?;
        let request = self
            .request(Method::GET, url.clone())
            .query(&[("list", "true")]);
        let response = self.send(request, &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = %url.path(), "Vault list returned 404, treating as empty");
            return Ok(Vec::new());
        }
        let body: VaultResponse<KeyList> = read_json(response, url.path()).await?;
        Ok(body.data.keys)
    }
}

/// Path segments of `mount` followed by `tail`; nested mounts such as
/// `team/pki` contribute one segment per component.
fn pki_segments<'a>(mount: &'a str, tail: &[&'a str]) -> Vec<&'a str> {
    mount
        .trim_matches('/')
        .split('/')
        .chain(tail.iter().copied())
        .collect()
}

async fn error_from_response(response: Response, path: &str) -> CatalogError {
    let status = response.status();
    let body: ErrorBody = response.json().await.unwrap_or_default();
    let detail = if body.errors.is_empty() {
        status.to_string()
    } else {
        format!("{}: {}", status, body.errors.join("; "))
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatalogError::authentication(format!("{} ({})", detail, path))
        }
        _ => CatalogError::backend(format!("vault returned {} for {}", detail, path)),
    }
}

async fn check_status(response: Response, path: &str) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_from_response(response, path).await)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, path: &str) -> Result<T> {
    let response = check_status(response, path).await?;
    response.json().await.map_err(|e| {
        CatalogError::backend(format!("malformed vault response for {}: {}", path, e))
    })
}

#[async_trait]
impl PkiConnection for HttpPkiConnection {
    async fn list_serials(&self, mount: &str) -> Result<Vec<String>> {
        self.list_keys(&pki_segments(mount, &["certs"])).await
    }

    async fn list_revoked(&self, mount: &str) -> Result<Vec<String>> {
        self.list_keys(&pki_segments(mount, &["certs", "revoked"])).await
    }

    async fn read_certificate(&self, mount: &str, serial: &str) -> Result<Option<String>> {
        let url = self.endpoint(&pki_segments(mount, &["cert", serial]))?;
        let response = self.send(self.request(Method::GET, url.clone()), &url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: VaultResponse<CertificateData> = read_json(response, url.path()).await?;
        if body.data.certificate.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(body.data.certificate))
    }

    async fn revoke(&self, mount: &str, serial: &str, write_token: &str) -> Result<()> {
        let url = self.endpoint(&pki_segments(mount, &["revoke"]))?;
        let request = self
            .client
            .post(url.clone())
            .header(TOKEN_HEADER, write_token)
            .json(&serde_json::json!({ "serial_number": serial }));
        let response = self.send(request, &url).await?;
        check_status(response, url.path()).await?;
        Ok(())
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = self.endpoint(&["sys", "health"])?;
        // Non-200 codes for sealed/uninitialized/standby are folded into 200
        // so the body always carries the state.
        let request = self.client.get(url.clone()).query(&[
            ("standbyok", "true"),
            ("perfstandbyok", "true"),
            ("sealedcode", "200"),
            ("uninitcode", "200"),
        ]);
        let response = self.send(request, &url).await?;
        read_json(response, url.path()).await
    }

    async fn lookup_self(&self) -> Result<()> {
        let url = self.endpoint(&["auth", "token", "lookup-self"])?;
        let response = self.send(self.request(Method::GET, url.clone()), &url).await?;
        check_status(response, url.path()).await?;
        Ok(())
    }

    async fn read_crl(&self, mount: &str) -> Result<String> {
        let url = self.endpoint(&pki_segments(mount, &["crl", "pem"]))?;
        let response = self.send(self.request(Method::GET, url.clone()), &url).await?;
        let response = check_status(response, url.path()).await?;
        response.text().await.map_err(|e| {
            CatalogError::backend(format!("failed to read CRL for {}: {}", mount, e))
        })
    }

    async fn rotate_crl(&self, mount: &str) -> Result<()> {
        let url = self.endpoint(&pki_segments(mount, &["crl", "rotate"]))?;
        let response = self.send(self.request(Method::GET, url.clone()), &url).await?;
        check_status(response, url.path()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> VaultInstance {
        VaultInstance {
            id: "a".to_string(),
            address: "https://vault.example.com:8200/".to_string(),
            token: SecretString::new("s.read"),
            pki_mounts: vec!["pki".to_string()],
            ..Default::default()
        }
    }

    fn endpoint(connection: &HttpPkiConnection, segments: &[&str]) -> Result<String> {
        connection.endpoint(segments).map(String::from)
    }

    #[test]
    fn test_url_building() {
        let connection =
            HttpPkiConnection::from_instance(&instance(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            endpoint(&connection, &pki_segments("pki", &["cert", "1a:2b"])).unwrap(),
            "https://vault.example.com:8200/v1/pki/cert/1a:2b"
        );
        assert_eq!(
            endpoint(&connection, &["sys", "health"]).unwrap(),
            "https://vault.example.com:8200/v1/sys/health"
        );
        assert_eq!(
            endpoint(&connection, &pki_segments("team/pki", &["certs"])).unwrap(),
            "https://vault.example.com:8200/v1/team/pki/certs"
        );
    }

    #[test]
    fn test_path_segments_are_confined() {
        let connection =
            HttpPkiConnection::from_instance(&instance(), Duration::from_secs(1)).unwrap();
        assert_eq!(
            endpoint(&connection, &pki_segments("pki", &["cert", "a/../../sys/raw"])).unwrap(),
            "https://vault.example.com:8200/v1/pki/cert/a%2F..%2F..%2Fsys%2Fraw"
        );
        for serial in ["..", ".", ""] {
            assert!(matches!(
                connection.endpoint(&pki_segments("pki", &["cert", serial])),
                Err(CatalogError::InvalidCertificateId { .. })
            ));
        }
        assert!(connection.endpoint(&pki_segments("pki/../sys", &["certs"])).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let connection =
            HttpPkiConnection::from_instance(&instance(), Duration::from_secs(1)).unwrap();
        let debug = format!("{:?}", connection);
        assert!(!debug.contains("s.read"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let result = HttpPkiConnection::new(
            "not a url",
            SecretString::new("t"),
            &TlsOptions::default(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(CatalogError::Config { .. })));
    }

    #[test]
    fn test_tls_options_from_base64() {
        let mut vault = instance();
        vault.tls_insecure = true;
        vault.tls_ca_cert_base64 =
            Some(base64::engine::general_purpose::STANDARD.encode("pem-bytes"));
        let tls = TlsOptions::from_instance(&vault).unwrap();
        assert!(tls.insecure);
        assert_eq!(tls.ca_pem.as_deref(), Some(b"pem-bytes".as_slice()));

        vault.tls_ca_cert_base64 = Some("***".to_string());
        assert!(TlsOptions::from_instance(&vault).is_err());
    }

    #[test]
    fn test_tls_options_missing_file() {
        let mut vault = instance();
        vault.tls_ca_cert = Some("/nonexistent/ca.pem".to_string());
        assert!(matches!(
            TlsOptions::from_instance(&vault),
            Err(CatalogError::Config { .. })
        ));
    }
}
