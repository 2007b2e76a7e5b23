//! Certificate value objects
//!
//! Plain records describing certificates as the catalog reports them.
//! `Certificate` is what listings return; `DetailedCertificate` adds the
//! cryptographic attributes and PEM text; `PemResponse` is the thin
//! projection used when only the material is needed.

mod decode;

pub use decode::{decode_certificate, DecodeError, DecodedCertificate};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Summary of one certificate
///
/// `id` is unique within one backend and mount. The single-vault client
/// reports it as `mount:serial`; the aggregator prefixes it with the vault id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: String,
    pub common_name: String,
    pub sans: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl Certificate {
    /// Build a summary from a decoded certificate
    pub fn from_decoded(id: impl Into<String>, decoded: &DecodedCertificate) -> Self {
        Self {
            id: id.into(),
            common_name: decoded.common_name.clone(),
            sans: decoded.sans.clone(),
            created_at: decoded.not_before,
            expires_at: decoded.not_after,
            revoked: false,
        }
    }

    /// Mark revoked; revocation is never cleared once observed
    pub fn mark_revoked(&mut self) {
        self.revoked = true;
    }

    /// Days until expiration, negative once expired
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }
}

/// Full certificate metadata plus its PEM material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DetailedCertificate {
    #[serde(flatten)]
    pub certificate: Certificate,
    /// Backend-local serial used to address the certificate within its mount
    pub serial_number: String,
    pub issuer: String,
    pub subject: String,
    pub key_algorithm: String,
    pub key_size: u32,
    #[serde(rename = "fingerprintSHA1")]
    pub fingerprint_sha1: String,
    #[serde(rename = "fingerprintSHA256")]
    pub fingerprint_sha256: String,
    pub usage: Vec<String>,
    pub pem: String,
}

impl DetailedCertificate {
    /// Build detailed metadata from a decoded certificate
    pub fn from_decoded(
        id: impl Into<String>,
        serial: impl Into<String>,
        decoded: DecodedCertificate,
        pem: impl Into<String>,
    ) -> Self {
        let certificate = Certificate::from_decoded(id, &decoded);
        Self {
            certificate,
            serial_number: serial.into(),
            issuer: decoded.issuer,
            subject: decoded.subject,
            key_algorithm: decoded.key_algorithm,
            key_size: decoded.key_size,
            fingerprint_sha1: decoded.fingerprint_sha1,
            fingerprint_sha256: decoded.fingerprint_sha256,
            usage: decoded.usage,
            pem: pem.into(),
        }
    }
}

/// Serial number plus raw PEM text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PemResponse {
    pub serial_number: String,
    pub pem: String,
}

/// Sort by common name, ties broken by id, for deterministic listings
pub fn sort_certificates(certificates: &mut [Certificate]) {
    certificates.sort_by(|left, right| {
        left.common_name.cmp(&right.common_name).then_with(|| left.id.cmp(&right.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cert(id: &str, cn: &str) -> Certificate {
        Certificate { id: id.to_string(), common_name: cn.to_string(), ..Default::default() }
    }

    #[test]
    fn test_sort_by_common_name_then_id() {
        let mut list = vec![cert("pki:2", "beta"), cert("pki:9", "alpha"), cert("pki:1", "beta")];
        sort_certificates(&mut list);

        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["pki:9", "pki:1", "pki:2"]);
    }

    #[test]
    fn test_certificate_json_shape() {
        let certificate = Certificate {
            id: "pki:aa".to_string(),
            common_name: "example.com".to_string(),
            sans: vec!["www.example.com".to_string()],
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            expires_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            revoked: false,
        };

        let json = serde_json::to_value(&certificate).unwrap();
        assert_eq!(json["commonName"], "example.com");
        assert_eq!(json["expiresAt"], "2025-01-01T00:00:00Z");
        assert_eq!(json["revoked"], false);
    }

    #[test]
    fn test_detailed_certificate_flattens_summary() {
        let detailed = DetailedCertificate {
            certificate: cert("pki:aa", "example.com"),
            serial_number: "aa".to_string(),
            fingerprint_sha256: "ff".to_string(),
            ..Default::default()
        };

        let json = serde_json::to_value(&detailed).unwrap();
        assert_eq!(json["id"], "pki:aa");
        assert_eq!(json["serialNumber"], "aa");
        assert_eq!(json["fingerprintSHA256"], "ff");
    }

    #[test]
    fn test_days_until_expiry() {
        let mut certificate = cert("pki:aa", "example.com");
        certificate.expires_at = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(certificate.days_until_expiry(now), 30);
    }
}
