//! Persistence layer for populated stores.
//!
//! Snapshots are written under a base directory, one file per named
//! index set, as pretty JSON or MessagePack. Writes go through a temp
//! file and a rename so a crashed save never leaves a torn snapshot.

mod snapshot;
mod source_ident;

pub use snapshot::{StoreSnapshot, SNAPSHOT_VERSION};
pub use source_ident::SourceIdentSerializer;

use std::path::{Path, PathBuf};
use std::str::FromStr;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use classdex_core::{Backing, Store};

use crate::error::IndexerError;

/// Snapshot encoding written by [`Storage::save`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    MsgPack,
}

impl SnapshotFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SnapshotFormat::Json => "json",
            SnapshotFormat::MsgPack => "msgpack",
        }
    }
}

impl FromStr for SnapshotFormat {
    type Err = IndexerError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "json" => Ok(SnapshotFormat::Json),
            "msgpack" => Ok(SnapshotFormat::MsgPack),
            other => Err(IndexerError::Configuration(format!(
                "unknown snapshot format: {other}"
            ))),
        }
    }
}

/// Render a store as the structured-text encoding: the same pretty JSON
/// a [`SnapshotFormat::Json`] save writes.
pub fn render_text(store: &Store) -> Result<String, IndexerError> {
    let snapshot = StoreSnapshot::from_store(store);
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Manages saved index snapshots under one base directory.
pub struct Storage {
    base_dir: PathBuf,
    format: SnapshotFormat,
}

impl Storage {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            format: SnapshotFormat::Json,
        }
    }

    pub fn with_format(mut self, format: SnapshotFormat) -> Self {
        self.format = format;
        self
    }

    /// Short stable name for the snapshot of a root set.
    pub fn snapshot_hash(roots: &[String]) -> String {
        let mut hasher = Sha256::new();
        for root in roots {
            hasher.update(root.as_bytes());
            hasher.update([0]);
        }
        format!("{:x}", hasher.finalize())[..16].to_string()
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.base_dir
            .join(format!("{name}.{}", self.format.extension()))
    }

    /// Serialize and atomically write the store. Returns the written
    /// location.
    pub async fn save(&self, store: &Store, name: &str) -> Result<PathBuf, IndexerError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;

        let data = match self.format {
            SnapshotFormat::Json => render_text(store)?.into_bytes(),
            SnapshotFormat::MsgPack => rmp_serde::to_vec(&StoreSnapshot::from_store(store))?,
        };

        let path = self.snapshot_path(name);
        let temp_path = self.base_dir.join(format!(".{name}.tmp"));
        tokio::fs::write(&temp_path, &data).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        info!(path = ?path, size = data.len(), "saved index snapshot");
        Ok(path)
    }

    /// Load the snapshot saved under `name`, trying this storage's
    /// format first and the other encoding second.
    pub async fn load(&self, name: &str, backing: Backing) -> Result<Store, IndexerError> {
        let formats = match self.format {
            SnapshotFormat::Json => [SnapshotFormat::Json, SnapshotFormat::MsgPack],
            SnapshotFormat::MsgPack => [SnapshotFormat::MsgPack, SnapshotFormat::Json],
        };
        for format in formats {
            let path = self
                .base_dir
                .join(format!("{name}.{}", format.extension()));
            if path.exists() {
                return Self::load_path(&path, backing).await;
            }
        }
        Err(IndexerError::NotFound(self.snapshot_path(name)))
    }

    /// Load a snapshot from an explicit file, deciding the encoding from
    /// the extension.
    pub async fn load_path(path: &Path, backing: Backing) -> Result<Store, IndexerError> {
        if !path.exists() {
            return Err(IndexerError::NotFound(path.to_path_buf()));
        }
        let data = tokio::fs::read(path).await?;
        let snapshot: StoreSnapshot = match path.extension().and_then(|e| e.to_str()) {
            Some("msgpack") => rmp_serde::from_slice(&data)?,
            _ => serde_json::from_slice(&data)?,
        };
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(IndexerError::Serialization(format!(
                "unsupported snapshot version {} in {}",
                snapshot.version,
                path.display()
            )));
        }
        debug!(path = ?path, indices = snapshot.indices.len(), "loaded index snapshot");
        Ok(snapshot.into_store(backing))
    }
}
