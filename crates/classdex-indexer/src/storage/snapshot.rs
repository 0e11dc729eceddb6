//! Serializable snapshot of a populated store.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use classdex_core::{Backing, Store};

/// Wire version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// A store flattened into sorted plain maps, plus provenance metadata.
/// The flattening drops the backing choice on purpose: a snapshot can be
/// reloaded into either a plain or a concurrent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub indices: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl StoreSnapshot {
    pub fn from_store(store: &Store) -> Self {
        let indices = store
            .index_names()
            .into_iter()
            .filter_map(|name| {
                let index = store.index(&name).ok()?;
                let table = index.entries().into_iter().collect();
                Some((name, table))
            })
            .collect();
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            indices,
        }
    }

    /// Rebuild a store with the given backing from this snapshot.
    pub fn into_store(self, backing: Backing) -> Store {
        let mut store = Store::with_backing(backing);
        for (name, table) in self.indices {
            let index = store.get_or_create(&name);
            for (key, values) in table {
                for value in values {
                    index.put(&key, &value);
                }
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_store() -> Store {
        let mut store = Store::new();
        let subtypes = store.get_or_create("SubTypes");
        subtypes.put("com.x.Base", "com.x.Service");
        subtypes.put("com.x.Base", "com.x.Client");
        let resources = store.get_or_create("Resources");
        resources.put("web.xml", "conf/web.xml");
        store
    }

    #[test]
    fn test_round_trips_index_contents() {
        let store = fixture_store();
        let snapshot = StoreSnapshot::from_store(&store);
        let restored = snapshot.into_store(Backing::Plain);

        assert_eq!(restored.index_names(), store.index_names());
        assert_eq!(
            restored.index("SubTypes").unwrap().entries(),
            store.index("SubTypes").unwrap().entries()
        );
        assert_eq!(
            restored.index("Resources").unwrap().entries(),
            store.index("Resources").unwrap().entries()
        );
    }

    #[test]
    fn test_backing_is_the_loaders_choice() {
        let snapshot = StoreSnapshot::from_store(&fixture_store());
        let concurrent = snapshot.into_store(Backing::Concurrent);
        assert_eq!(concurrent.backing(), Backing::Concurrent);
        assert_eq!(concurrent.index("SubTypes").unwrap().key_count(), 1);
    }

    #[test]
    fn test_snapshot_carries_version() {
        let snapshot = StoreSnapshot::from_store(&Store::new());
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"version\":1"));
    }
}
