//! Classdex Indexing Engine
//!
//! Walks class containers (directory trees, zip/jar archives, streamed
//! tar archives), extracts structural facts from class files without
//! loading them, and answers name-level queries over the resulting
//! indices. [`Classdex`] is the query facade over a populated
//! [`Store`]; scanning happens through [`ScanSession`].

pub mod adapter;
pub mod classfile;
mod error;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod vfs;

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::info;

use classdex_core::{Backing, NameFilter, Store, StoreError};

pub use adapter::{ClassFileAdapter, MetadataAdapter, ModelAdapter};
pub use error::IndexerError;
pub use scanner::{Scanner, ScannerKind};
pub use session::{ScanReport, ScanSession};
pub use storage::{SnapshotFormat, SourceIdentSerializer, Storage, StoreSnapshot};

use scanner::INHERITED_ANNOTATION;

/// Root of every scanned hierarchy.
const OBJECT: &str = "java.lang.Object";

/// Query facade over one populated store.
///
/// Every answer is a name string; no live handle to a scanned entity is
/// ever held, so a `Classdex` stays valid after the scanned containers
/// are gone. Queries against an index whose scanner never ran fail with
/// [`StoreError::NotConfigured`] instead of answering empty.
pub struct Classdex {
    store: Store,
}

impl Classdex {
    pub fn from_store(store: Store) -> Self {
        Self { store }
    }

    /// The store behind a finished scan.
    pub fn from_report(report: ScanReport) -> Self {
        Self::from_store(report.store)
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_store(self) -> Store {
        self.store
    }

    /// Every type reachable from the hierarchy root. Requires a SubTypes
    /// scan configured without the default root-type exclusion.
    pub fn all_types(&self) -> Result<Vec<String>, IndexerError> {
        let types = self.store.transitive_closure(
            ScannerKind::SubTypes.index_name(),
            [OBJECT],
            false,
        )?;
        if types.is_empty() {
            return Err(IndexerError::Configuration(format!(
                "no types were indexed under {OBJECT}; \
                 scan with a SubTypes scanner that does not exclude it"
            )));
        }
        Ok(dedup_sorted(types))
    }

    /// Transitive subtypes of a type, the seed excluded.
    pub fn subtypes_of(&self, type_name: &str) -> Result<Vec<String>, IndexerError> {
        let subtypes = self.store.transitive_closure(
            ScannerKind::SubTypes.index_name(),
            [type_name],
            false,
        )?;
        Ok(dedup_sorted(subtypes))
    }

    /// Types carrying the given tag.
    ///
    /// With `honor_inherited` set, an inheritable tag additionally
    /// reaches every subtype of a directly tagged type, and a
    /// non-inheritable tag reaches only the direct carriers. A tag
    /// counts as inheritable when the scan recorded it under the
    /// inheritance marker; propagation follows every recorded hierarchy
    /// edge, interface edges included. Without `honor_inherited`, the
    /// tag is also followed as a meta-tag (types tagged with a tagged
    /// tag type) before the subtype expansion.
    pub fn types_tagged_with(
        &self,
        tag: &str,
        honor_inherited: bool,
    ) -> Result<Vec<String>, IndexerError> {
        let annotations = ScannerKind::TypeAnnotations.index_name();
        let subtypes = ScannerKind::SubTypes.index_name();

        let direct = self.store.get(annotations, [tag])?;
        let all = if honor_inherited {
            if self.is_inheritable(tag)? {
                let mut all = direct.clone();
                all.extend(self.store.transitive_closure(subtypes, direct, false)?);
                all
            } else {
                direct
            }
        } else {
            let tagged = self.store.transitive_closure(annotations, direct, true)?;
            self.store.transitive_closure(subtypes, tagged, true)?
        };
        Ok(dedup_sorted(all))
    }

    /// Fields carrying the given tag, as `Type.field` keys.
    pub fn fields_tagged_with(&self, tag: &str) -> Result<Vec<String>, IndexerError> {
        let fields = self
            .store
            .get(ScannerKind::FieldAnnotations.index_name(), [tag])?;
        Ok(dedup_sorted(fields))
    }

    /// Callables carrying the given tag, as full method keys.
    pub fn methods_tagged_with(&self, tag: &str) -> Result<Vec<String>, IndexerError> {
        let methods = self
            .store
            .get(ScannerKind::MethodAnnotations.index_name(), [tag])?;
        Ok(dedup_sorted(methods))
    }

    /// Callables declaring exactly the given ordered parameter types.
    pub fn methods_with_param_types<S: AsRef<str>>(
        &self,
        types: &[S],
    ) -> Result<Vec<String>, IndexerError> {
        let rendered: Vec<&str> = types.iter().map(AsRef::as_ref).collect();
        let key = format!("[{}]", rendered.join(", "));
        let methods = self
            .store
            .get(ScannerKind::MethodParameters.index_name(), [key])?;
        Ok(dedup_sorted(methods))
    }

    /// Callables declaring the given return type.
    pub fn methods_returning(&self, type_name: &str) -> Result<Vec<String>, IndexerError> {
        let methods = self
            .store
            .get(ScannerKind::MethodParameters.index_name(), [type_name])?;
        Ok(dedup_sorted(methods))
    }

    /// Callables with the given tag on any parameter position.
    pub fn methods_with_any_param_tagged(&self, tag: &str) -> Result<Vec<String>, IndexerError> {
        let methods = self
            .store
            .get(ScannerKind::MethodParameters.index_name(), [tag])?;
        Ok(dedup_sorted(methods))
    }

    /// Declared parameter names of the callable with the given full key.
    /// Empty when the names were not compiled in or the key is ambiguous.
    pub fn method_param_names(&self, method_key: &str) -> Result<Vec<String>, IndexerError> {
        let names = self
            .store
            .get(ScannerKind::MethodParameterNames.index_name(), [method_key])?;
        match names.as_slice() {
            [joined] => Ok(joined.split(", ").map(str::to_string).collect()),
            _ => Ok(Vec::new()),
        }
    }

    /// Call sites and field accesses targeting the given member key, as
    /// `using full key #line` strings.
    pub fn usages_of(&self, member_key: &str) -> Result<Vec<String>, IndexerError> {
        let usages = self
            .store
            .get(ScannerKind::MemberUsage.index_name(), [member_key])?;
        Ok(dedup_sorted(usages))
    }

    /// Relative paths of indexed resources whose simple name matches the
    /// pattern.
    pub fn resources(&self, pattern: &str) -> Result<Vec<String>, IndexerError> {
        let regex = Regex::new(pattern)
            .map_err(|e| IndexerError::Configuration(format!("invalid resource pattern: {e}")))?;
        let index = self.store.index(ScannerKind::Resources.index_name())?;
        let keys: Vec<String> = index
            .keys()
            .into_iter()
            .filter(|name| regex.is_match(name))
            .collect();
        Ok(dedup_sorted(
            self.store.get(ScannerKind::Resources.index_name(), keys)?,
        ))
    }

    /// Every type the TypeElements scanner recorded, sorted.
    pub fn types(&self) -> Result<Vec<String>, IndexerError> {
        Ok(self.store.index(ScannerKind::TypeElements.index_name())?.keys())
    }

    /// Union another instance's indices into this one.
    pub fn merge(&mut self, other: &Classdex) {
        self.store.merge(&other.store);
    }

    /// Serialize to `path`, atomically; a `.msgpack` extension selects
    /// MessagePack, anything else pretty JSON.
    pub async fn save(&self, path: &Path) -> Result<PathBuf, IndexerError> {
        let snapshot = StoreSnapshot::from_store(&self.store);
        let data = match path.extension().and_then(|e| e.to_str()) {
            Some("msgpack") => rmp_serde::to_vec(&snapshot)?,
            _ => serde_json::to_string_pretty(&snapshot)?.into_bytes(),
        };

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IndexerError::Configuration(format!("bad save path: {path:?}")))?;
        let temp_path = parent.join(format!(".{file_name}.tmp"));
        tokio::fs::write(&temp_path, &data).await?;
        tokio::fs::rename(&temp_path, path).await?;

        info!(path = ?path, size = data.len(), "saved index");
        Ok(path.to_path_buf())
    }

    /// Load a previously saved snapshot.
    pub async fn load(path: &Path) -> Result<Self, IndexerError> {
        let store = Storage::load_path(path, Backing::Plain).await?;
        Ok(Self::from_store(store))
    }

    /// Merge every saved snapshot found under `prefix` across the given
    /// roots whose file name passes the filter. A snapshot that fails to
    /// parse fails the collect.
    pub fn collect(
        roots: &[String],
        prefix: &str,
        name_filter: &NameFilter,
    ) -> Result<Self, IndexerError> {
        let mut merged = Store::new();
        for unit in vfs::find_files(roots, prefix, name_filter) {
            let snapshot: StoreSnapshot = if unit.relative_path.ends_with(".msgpack") {
                rmp_serde::from_slice(&unit.data)?
            } else {
                serde_json::from_slice(&unit.data)?
            };
            merged.merge(&snapshot.into_store(Backing::Plain));
        }
        Ok(Self::from_store(merged))
    }

    fn is_inheritable(&self, tag: &str) -> Result<bool, StoreError> {
        let index = self.store.index(ScannerKind::TypeAnnotations.index_name())?;
        Ok(index.get(INHERITED_ANNOTATION).iter().any(|t| t == tag))
    }
}

impl From<Store> for Classdex {
    fn from(store: Store) -> Self {
        Self::from_store(store)
    }
}

fn dedup_sorted(mut values: Vec<String>) -> Vec<String> {
    values.sort();
    values.dedup();
    values
}
