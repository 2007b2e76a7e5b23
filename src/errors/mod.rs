//! # Error Handling
//!
//! Error types for the certificate catalog, built on `thiserror`.

mod types;

pub use types::{CatalogError, Result};
