//! Core error types for classdex.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the store, name filters, and configuration.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query against an index that no scanner ever wrote
    #[error("scanner {0} was not configured")]
    NotConfigured(String),

    /// Malformed include/exclude filter specification
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// Malformed configuration file
    #[error("invalid configuration at {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },
}
