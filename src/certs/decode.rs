//! PEM / X.509 decoding
//!
//! Turns the PEM text a PKI backend stores into the attributes the catalog
//! reports. Only the first certificate block is considered.

use chrono::{DateTime, Utc};
use ring::digest;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::public_key::PublicKey;

/// Reasons a stored record cannot be turned into a certificate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("no PEM block found: {0}")]
    MissingPem(String),

    #[error("PEM block is labelled '{0}', expected CERTIFICATE")]
    WrongLabel(String),

    #[error("invalid X.509 certificate: {0}")]
    InvalidCertificate(String),

    #[error("validity timestamp out of range")]
    InvalidValidity,
}

/// Attributes extracted from one X.509 certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedCertificate {
    pub common_name: String,
    /// DNS names, then IP addresses, then e-mail addresses
    pub sans: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: String,
    pub subject: String,
    pub key_algorithm: String,
    pub key_size: u32,
    pub fingerprint_sha1: String,
    pub fingerprint_sha256: String,
    pub usage: Vec<String>,
}

/// Decode the first PEM certificate in `pem`
pub fn decode_certificate(pem: &str) -> Result<DecodedCertificate, DecodeError> {
    let (_, block) =
        parse_x509_pem(pem.as_bytes()).map_err(|e| DecodeError::MissingPem(e.to_string()))?;

    if block.label != "CERTIFICATE" {
        return Err(DecodeError::WrongLabel(block.label));
    }

    let cert = block.parse_x509().map_err(|e| DecodeError::InvalidCertificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let mut dns = Vec::new();
    let mut ips = Vec::new();
    let mut emails = Vec::new();
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(value) => dns.push(value.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        ips.push(ip.to_string());
                    }
                }
                GeneralName::RFC822Name(value) => emails.push(value.to_string()),
                _ => {}
            }
        }
    }
    let mut sans = dns;
    sans.extend(ips);
    sans.extend(emails);

    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or(DecodeError::InvalidValidity)?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or(DecodeError::InvalidValidity)?;

    let (key_algorithm, key_size) = describe_public_key(&cert);

    let mut usage = Vec::new();
    if let Ok(Some(eku)) = cert.extended_key_usage() {
        let eku = eku.value;
        if eku.server_auth {
            usage.push("Server Auth".to_string());
        }
        if eku.client_auth {
            usage.push("Client Auth".to_string());
        }
        if eku.code_signing {
            usage.push("Code Signing".to_string());
        }
        if eku.email_protection {
            usage.push("Email Protection".to_string());
        }
    }

    Ok(DecodedCertificate {
        common_name,
        sans,
        not_before,
        not_after,
        issuer: cert.issuer().to_string(),
        subject: cert.subject().to_string(),
        key_algorithm,
        key_size,
        fingerprint_sha1: fingerprint(&digest::SHA1_FOR_LEGACY_USE_ONLY, &block.contents),
        fingerprint_sha256: fingerprint(&digest::SHA256, &block.contents),
        usage,
    })
}

fn describe_public_key(cert: &x509_parser::certificate::X509Certificate<'_>) -> (String, u32) {
    let spki = cert.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(key)) => ("RSA".to_string(), key.key_size() as u32),
        Ok(PublicKey::EC(point)) => ("ECDSA".to_string(), point.key_size() as u32),
        Ok(PublicKey::DSA(_)) => ("DSA".to_string(), 0),
        _ => {
            let oid = spki.algorithm.algorithm.to_id_string();
            let name = match oid.as_str() {
                "1.3.101.112" => "Ed25519".to_string(),
                "1.3.101.113" => "Ed448".to_string(),
                _ => oid,
            };
            (name, 0)
        }
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

fn fingerprint(algorithm: &'static digest::Algorithm, der: &[u8]) -> String {
    hex::encode(digest::digest(algorithm, der).as_ref())
}
