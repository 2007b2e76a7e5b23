//! # Error Types
//!
//! One error enum covers every failure the catalog can report. Callers
//! distinguish the "vault is not configured" sentinel, caller-facing
//! identifier problems, and backend faults without string matching.

use std::time::Duration;

/// Custom result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors produced by the certificate catalog
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No backend is configured (disabled client, or an aggregator with zero vaults)
    #[error("vault is not configured")]
    NotConfigured,

    /// The backend could not be reached
    #[error("vault connection failed: {message}")]
    Connection { message: String },

    /// The backend rejected the supplied credential
    #[error("vault authentication failed: {message}")]
    Authentication { message: String },

    /// The backend reports it has not been initialized
    #[error("vault is not initialized")]
    Uninitialized,

    /// The backend reports it is sealed
    #[error("vault is sealed")]
    Sealed,

    /// A composite certificate identifier could not be parsed
    #[error("invalid certificate id: '{id}'")]
    InvalidCertificateId { id: String },

    /// The identifier names a mount the client does not serve
    #[error("mount {mount} is not configured")]
    UnknownMount { mount: String },

    /// The identifier has no mount prefix and the client serves several mounts
    #[error("certificate id '{id}' is ambiguous: specify the mount as 'mount:serial'")]
    UnresolvableId { id: String },

    /// The serial does not exist under the mount
    #[error("certificate {serial} not found in mount {mount}")]
    NotFound { mount: String, serial: String },

    /// The stored record is not a parseable certificate
    #[error("failed to decode certificate {serial} in mount {mount}: {reason}")]
    Decode { mount: String, serial: String, reason: String },

    /// Revocation was attempted without a write token
    #[error("a write token is required to revoke certificates")]
    MissingWriteToken,

    /// The aggregator knows the vault id but holds no usable client for it
    #[error("missing vault client for {vault_id}")]
    MissingClient { vault_id: String },

    /// A diagnostic listing did not finish before its deadline
    #[error("listing certificates from {vault_id} timed out after {}ms", after.as_millis())]
    Timeout { vault_id: String, after: Duration },

    /// Configuration loading or normalization failed
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Any other backend response (server errors, malformed payloads)
    #[error("vault backend error: {message}")]
    Backend { message: String },
}

impl CatalogError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection { message: message.into() }
    }

    /// Create an authentication error
    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication { message: message.into() }
    }

    /// Create an invalid identifier error
    pub fn invalid_id<S: Into<String>>(id: S) -> Self {
        Self::InvalidCertificateId { id: id.into() }
    }

    /// Create a not found error
    pub fn not_found<M: Into<String>, S: Into<String>>(mount: M, serial: S) -> Self {
        Self::NotFound { mount: mount.into(), serial: serial.into() }
    }

    /// Create a decode error
    pub fn decode<M: Into<String>, S: Into<String>, R: Into<String>>(
        mount: M,
        serial: S,
        reason: R,
    ) -> Self {
        Self::Decode { mount: mount.into(), serial: serial.into(), reason: reason.into() }
    }

    /// Create a missing client error
    pub fn missing_client<S: Into<String>>(vault_id: S) -> Self {
        Self::MissingClient { vault_id: vault_id.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a generic backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend { message: message.into() }
    }

    /// True for the "vault is not configured" sentinel.
    ///
    /// Health reporting uses this to suppress alerts for intentionally
    /// disabled deployments.
    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }

    /// True when the caller supplied something unusable and retrying cannot help
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCertificateId { .. }
                | Self::UnknownMount { .. }
                | Self::UnresolvableId { .. }
                | Self::NotFound { .. }
                | Self::MissingWriteToken
        )
    }

    /// Get the HTTP status code an API layer should return for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotConfigured => 503,
            Self::Connection { .. } => 502,
            Self::Authentication { .. } => 502,
            Self::Uninitialized | Self::Sealed => 503,
            Self::InvalidCertificateId { .. } => 400,
            Self::UnknownMount { .. } => 404,
            Self::UnresolvableId { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Decode { .. } => 422,
            Self::MissingWriteToken => 401,
            Self::MissingClient { .. } => 404,
            Self::Timeout { .. } => 504,
            Self::Config { .. } => 500,
            Self::Backend { .. } => 502,
        }
    }
}

impl From<validator::ValidationErrors> for CatalogError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::config(format!("Validation failed: {}", message))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(error: serde_json::Error) -> Self {
        Self::config(format!("invalid settings content: {}", error))
    }
}
