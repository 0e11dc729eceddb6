//! Named multimap indices and the store that owns them.
//!
//! Every scanner writes string facts into exactly one [`Index`]; the
//! [`Store`] maps index names to tables and answers multi-key and
//! transitive-closure queries over them. Nothing but strings is ever
//! stored, so a populated store stays valid after the scanned inputs
//! are gone.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::StoreError;

/// Backing strategy for index tables.
///
/// Sequential scans use `Plain` (an uncontended lock around a plain map);
/// parallel scans use `Concurrent` so many workers can insert at once
/// without lost updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Plain,
    Concurrent,
}

enum Table {
    Plain(RwLock<HashMap<String, BTreeSet<String>>>),
    Concurrent(DashMap<String, BTreeSet<String>>),
}

/// One named key -> value-set table.
///
/// Cloning an `Index` clones a handle to the same table, so a scanner can
/// keep its bound index while the session owns the store.
#[derive(Clone)]
pub struct Index {
    table: Arc<Table>,
}

impl Index {
    fn new(backing: Backing) -> Self {
        let table = match backing {
            Backing::Plain => Table::Plain(RwLock::new(HashMap::new())),
            Backing::Concurrent => Table::Concurrent(DashMap::new()),
        };
        Self {
            table: Arc::new(table),
        }
    }

    /// Insert one value under a key. Returns true if the value was not
    /// already present.
    pub fn put(&self, key: &str, value: &str) -> bool {
        match &*self.table {
            Table::Plain(map) => map
                .write()
                .entry(key.to_string())
                .or_default()
                .insert(value.to_string()),
            Table::Concurrent(map) => map
                .entry(key.to_string())
                .or_default()
                .insert(value.to_string()),
        }
    }

    /// Values recorded under one key, in sorted order. Empty when the key
    /// is absent.
    pub fn get(&self, key: &str) -> Vec<String> {
        match &*self.table {
            Table::Plain(map) => map
                .read()
                .get(key)
                .map(|values| values.iter().cloned().collect())
                .unwrap_or_default(),
            Table::Concurrent(map) => map
                .get(key)
                .map(|values| values.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match &*self.table {
            Table::Plain(map) => map.read().contains_key(key),
            Table::Concurrent(map) => map.contains_key(key),
        }
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = match &*self.table {
            Table::Plain(map) => map.read().keys().cloned().collect(),
            Table::Concurrent(map) => map.iter().map(|e| e.key().clone()).collect(),
        };
        keys.sort();
        keys
    }

    /// Snapshot of the whole table, sorted by key.
    pub fn entries(&self) -> Vec<(String, BTreeSet<String>)> {
        let mut entries: Vec<(String, BTreeSet<String>)> = match &*self.table {
            Table::Plain(map) => map
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            Table::Concurrent(map) => map
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn key_count(&self) -> usize {
        match &*self.table {
            Table::Plain(map) => map.read().len(),
            Table::Concurrent(map) => map.len(),
        }
    }

    /// Total number of stored values across all keys.
    pub fn value_count(&self) -> usize {
        match &*self.table {
            Table::Plain(map) => map.read().values().map(BTreeSet::len).sum(),
            Table::Concurrent(map) => map.iter().map(|e| e.value().len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("keys", &self.key_count())
            .field("values", &self.value_count())
            .finish()
    }
}

/// The aggregate index for one scan session: index name -> [`Index`].
///
/// Indices are created on first write and never destroyed while the store
/// lives. Reading an index that was never created is an error, so callers
/// can tell "scanner ran, found nothing" apart from "scanner never ran".
pub struct Store {
    backing: Backing,
    indices: HashMap<String, Index>,
}

impl Store {
    /// A store with plain (single-writer) index tables.
    pub fn new() -> Self {
        Self::with_backing(Backing::Plain)
    }

    /// A store whose index tables accept concurrent writers.
    pub fn concurrent() -> Self {
        Self::with_backing(Backing::Concurrent)
    }

    pub fn with_backing(backing: Backing) -> Self {
        Self {
            backing,
            indices: HashMap::new(),
        }
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    /// Returns the named index, creating an empty one if needed.
    pub fn get_or_create(&mut self, name: &str) -> Index {
        self.indices
            .entry(name.to_string())
            .or_insert_with(|| Index::new(self.backing))
            .clone()
    }

    /// Returns the named index, failing if it was never created.
    pub fn index(&self, name: &str) -> Result<&Index, StoreError> {
        self.indices
            .get(name)
            .ok_or_else(|| StoreError::NotConfigured(name.to_string()))
    }

    /// All materialized index names, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Concatenated values for each given key in one index. Duplicates
    /// across keys are preserved; callers wanting a set must dedupe.
    pub fn get<I, K>(&self, name: &str, keys: I) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let index = self.index(name)?;
        let mut values = Vec::new();
        for key in keys {
            values.extend(index.get(key.as_ref()));
        }
        Ok(values)
    }

    /// Follows the key -> values relation transitively: every value found
    /// becomes a new key until no unseen key remains. When `include_seeds`
    /// is false the seed keys themselves are left out of the result (their
    /// direct values still seed the walk).
    ///
    /// Visited keys are never re-expanded, so a cyclic relation terminates
    /// instead of recursing forever.
    pub fn transitive_closure<I, K>(
        &self,
        name: &str,
        seeds: I,
        include_seeds: bool,
    ) -> Result<Vec<String>, StoreError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let index = self.index(name)?;
        let mut result = Vec::new();
        let mut visited = BTreeSet::new();
        let mut frontier = VecDeque::new();

        for seed in seeds {
            let seed = seed.into();
            if include_seeds {
                result.push(seed.clone());
            }
            if visited.insert(seed.clone()) {
                frontier.push_back(seed);
            }
        }

        while let Some(key) = frontier.pop_front() {
            for value in index.get(&key) {
                result.push(value.clone());
                if visited.insert(value.clone()) {
                    frontier.push_back(value);
                }
            }
        }

        Ok(result)
    }

    /// Union another store's contents into this one.
    pub fn merge(&mut self, other: &Store) {
        for name in other.index_names() {
            let target = self.get_or_create(&name);
            if let Ok(source) = other.index(&name) {
                for (key, values) in source.entries() {
                    for value in values {
                        target.put(&key, &value);
                    }
                }
            }
        }
    }

    /// Total key count across all indices.
    pub fn key_count(&self) -> usize {
        self.indices.values().map(Index::key_count).sum()
    }

    /// Total value count across all indices.
    pub fn value_count(&self) -> usize {
        self.indices.values().map(Index::value_count).sum()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backing", &self.backing)
            .field("indices", &self.index_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entries: &[(&str, &str, &str)]) -> Store {
        let mut store = Store::new();
        for (index, key, value) in entries {
            store.get_or_create(index).put(key, value);
        }
        store
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut store = Store::new();
        let first = store.get_or_create("SubTypes");
        first.put("a", "b");
        let second = store.get_or_create("SubTypes");
        assert_eq!(second.get("a"), vec!["b".to_string()]);
    }

    #[test]
    fn test_missing_index_is_an_error_not_empty() {
        let store = Store::new();
        let err = store.index("SubTypes").unwrap_err();
        assert!(matches!(err, StoreError::NotConfigured(ref name) if name == "SubTypes"));
    }

    #[test]
    fn test_get_preserves_duplicates_across_keys() {
        let store = store_with(&[
            ("idx", "k1", "shared"),
            ("idx", "k2", "shared"),
            ("idx", "k2", "only2"),
        ]);
        let values = store.get("idx", ["k1", "k2"]).unwrap();
        assert_eq!(values, vec!["shared", "only2", "shared"]);
    }

    #[test]
    fn test_closure_follows_chains() {
        let store = store_with(&[("idx", "a", "b"), ("idx", "b", "c"), ("idx", "c", "d")]);
        let all = store.transitive_closure("idx", ["a"], false).unwrap();
        assert_eq!(all, vec!["b", "c", "d"]);

        let including = store.transitive_closure("idx", ["a"], true).unwrap();
        assert_eq!(including, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_closure_terminates_on_cycle() {
        let store = store_with(&[("idx", "A", "B"), ("idx", "B", "A")]);
        let result = store.transitive_closure("idx", ["A"], true).unwrap();
        let set: BTreeSet<String> = result.into_iter().collect();
        assert_eq!(
            set,
            ["A", "B"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_closure_on_empty_result_is_empty_not_error() {
        let mut store = Store::new();
        store.get_or_create("idx");
        let result = store.transitive_closure("idx", ["missing"], false).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_merge_unions_indices() {
        let mut left = store_with(&[("idx", "k", "v1")]);
        let right = store_with(&[("idx", "k", "v2"), ("other", "x", "y")]);
        left.merge(&right);
        assert_eq!(left.get("idx", ["k"]).unwrap(), vec!["v1", "v2"]);
        assert_eq!(left.index("other").unwrap().get("x"), vec!["y".to_string()]);
    }

    #[test]
    fn test_counts() {
        let store = store_with(&[("idx", "k1", "v1"), ("idx", "k1", "v2"), ("idx", "k2", "v1")]);
        assert_eq!(store.key_count(), 2);
        assert_eq!(store.value_count(), 3);
    }

    #[test]
    fn test_concurrent_backing_accepts_parallel_writers() {
        let mut store = Store::concurrent();
        let index = store.get_or_create("idx");

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let index = index.clone();
                scope.spawn(move || {
                    for i in 0..100 {
                        index.put(&format!("key{}", i % 10), &format!("w{worker}v{i}"));
                    }
                });
            }
        });

        assert_eq!(index.key_count(), 10);
        assert_eq!(index.value_count(), 800);
    }
}
