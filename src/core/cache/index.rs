use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// On-disk shape of `cache-index.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheIndex {
    /// operation name → comma-joined keys → entry
    #[serde(default)]
    pub operations: BTreeMap<String, BTreeMap<String, CacheEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Payload file name, relative to the operation's directory.
    pub filename: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Exclusive owner of the in-memory cache index.
///
/// Every read or write goes through one coarse lock, held only for the map
/// operation itself and never across a network call or file write.
#[derive(Debug, Default)]
pub struct CacheIndexStore {
    index: Mutex<CacheIndex>,
}

impl CacheIndexStore {
    pub fn new(index: CacheIndex) -> Self {
        Self {
            index: Mutex::new(index),
        }
    }

    fn with_index<R>(&self, f: impl FnOnce(&mut CacheIndex) -> R) -> R {
        let mut guard = self
            .index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn get(&self, operation: &str, key: &str) -> Option<CacheEntry> {
        self.with_index(|index| {
            index
                .operations
                .get(operation)
                .and_then(|entries| entries.get(key))
                .cloned()
        })
    }

    /// Insert or overwrite, returning the replaced entry.
    pub fn put(&self, operation: &str, key: &str, entry: CacheEntry) -> Option<CacheEntry> {
        self.with_index(|index| {
            index
                .operations
                .entry(operation.to_string())
                .or_default()
                .insert(key.to_string(), entry)
        })
    }

    /// Remove `key` only if it still holds `expected`; a concurrent writer may
    /// have replaced it in the meantime.
    pub fn remove_if(&self, operation: &str, key: &str, expected: &CacheEntry) -> bool {
        self.with_index(|index| {
            let Some(entries) = index.operations.get_mut(operation) else {
                return false;
            };
            if entries.get(key) != Some(expected) {
                return false;
            }
            entries.remove(key);
            if entries.is_empty() {
                index.operations.remove(operation);
            }
            true
        })
    }

    /// Drop every entry that is no longer live and return them.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> Vec<(String, CacheEntry)> {
        self.remove_where(|entry| !entry.is_live(now))
    }

    pub fn remove_where(
        &self,
        mut predicate: impl FnMut(&CacheEntry) -> bool,
    ) -> Vec<(String, CacheEntry)> {
        self.with_index(|index| {
            let mut removed = Vec::new();
            for (operation, entries) in index.operations.iter_mut() {
                entries.retain(|_, entry| {
                    if predicate(entry) {
                        removed.push((operation.clone(), entry.clone()));
                        false
                    } else {
                        true
                    }
                });
            }
            index.operations.retain(|_, entries| !entries.is_empty());
            removed
        })
    }

    /// (operation, filename) pairs still referenced by the index.
    pub fn referenced_payloads(&self) -> HashSet<(String, String)> {
        self.with_index(|index| {
            index
                .operations
                .iter()
                .flat_map(|(operation, entries)| {
                    entries
                        .values()
                        .map(move |e| (operation.clone(), e.filename.clone()))
                })
                .collect()
        })
    }

    pub fn snapshot(&self) -> CacheIndex {
        self.with_index(|index| index.clone())
    }

    pub fn len(&self) -> usize {
        self.with_index(|index| index.operations.values().map(BTreeMap::len).sum())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(name: &str, expires_at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            filename: name.to_string(),
            expires_at,
        }
    }

    #[test]
    fn index_serializes_with_documented_shape() {
        let store = CacheIndexStore::default();
        let at = "2030-01-01T00:00:00Z".parse().unwrap();
        store.put("getProject", "terralith", entry("a.json", at));

        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(
            json["operations"]["getProject"]["terralith"]["filename"],
            "a.json"
        );
        assert!(json["operations"]["getProject"]["terralith"]["expiresAt"].is_string());
    }

    #[test]
    fn remove_expired_keeps_live_entries() {
        let now = Utc::now();
        let store = CacheIndexStore::default();
        store.put("op", "old", entry("old.json", now - Duration::seconds(1)));
        store.put("op", "new", entry("new.json", now + Duration::hours(1)));

        let removed = store.remove_expired(now);

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].1.filename, "old.json");
        assert!(store.get("op", "new").is_some());
        assert!(store.get("op", "old").is_none());
    }

    #[test]
    fn remove_if_ignores_replaced_entries() {
        let now = Utc::now();
        let store = CacheIndexStore::default();
        let first = entry("first.json", now);
        store.put("op", "k", first.clone());
        store.put("op", "k", entry("second.json", now));

        assert!(!store.remove_if("op", "k", &first));
        assert_eq!(store.len(), 1);
    }
}
