//! Indexer error types.

use thiserror::Error;

use crate::classfile::ClassFileError;
use classdex_core::StoreError;

/// Errors that can occur while opening containers, building descriptors,
/// scanning, or persisting a store.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A root container could not be opened or iterated
    #[error("could not open container {path}: {message}")]
    ContainerOpen { path: String, message: String },

    /// A container entry could not be turned into a type descriptor
    #[error("could not create class descriptor from {path}")]
    Descriptor {
        path: String,
        #[source]
        source: ClassFileError,
    },

    /// No archive boundary could be located in an adapted URL
    #[error("unable to identify the real archive in path: {0}")]
    ArchiveBoundary(String),

    /// Unrecognized root locator or invalid scan setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No saved snapshot at the given location
    #[error("path not found: {0}")]
    NotFound(std::path::PathBuf),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Store-level failure surfaced through a scan or query
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for IndexerError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for IndexerError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        IndexerError::Serialization(e.to_string())
    }
}
