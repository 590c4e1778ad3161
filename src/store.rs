//! Concurrent per-application aggregate store.
//!
//! Backed by a sharded `DashMap`: every mutation goes through the entry API,
//! which holds the shard's write lock while the closure runs. A
//! read-modify-write on one key is therefore linearizable against every other
//! writer of that key, while keys on other shards proceed in parallel.
//! Closures must stay synchronous and short; never await while holding an entry.

use dashmap::DashMap;

use crate::types::{AppDetail, AppKey};

#[derive(Debug, Default)]
pub struct AppStore {
    apps: DashMap<String, AppDetail>,
}

impl AppStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the aggregate for an org/space/app triple.
    pub fn get(&self, org: &str, space: &str, app: &str) -> Option<AppDetail> {
        self.get_key(&AppKey::new(org, space, app))
    }

    pub fn get_key(&self, key: &AppKey) -> Option<AppDetail> {
        self.apps.get(key.as_str()).map(|entry| entry.value().clone())
    }

    /// Atomically mutate the aggregate for `key`, materializing a zero-valued
    /// one first if none exists. Returns whatever the closure returns.
    pub fn update<R>(&self, key: &AppKey, f: impl FnOnce(&mut AppDetail) -> R) -> R {
        let mut entry = self.apps.entry(key.as_str().to_owned()).or_default();
        f(entry.value_mut())
    }

    /// Replace the aggregate for `key`, returning the previous value.
    pub fn upsert(&self, key: &AppKey, detail: AppDetail) -> Option<AppDetail> {
        self.apps.insert(key.as_str().to_owned(), detail)
    }

    /// Store `new` only if the current value equals `expected`; `None` as
    /// `expected` means "absent". Returns whether the swap happened.
    pub fn compare_and_swap(
        &self,
        key: &AppKey,
        expected: Option<&AppDetail>,
        new: AppDetail,
    ) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.apps.entry(key.as_str().to_owned()) {
            Entry::Occupied(mut occupied) => {
                if expected == Some(occupied.get()) {
                    occupied.insert(new);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(new);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn contains(&self, key: &AppKey) -> bool {
        self.apps.contains_key(key.as_str())
    }

    /// Current keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Point-in-time copy of every aggregate, sorted by key. Each entry is
    /// consistent on its own; the set as a whole is not a global snapshot.
    pub fn snapshot(&self) -> Vec<(String, AppDetail)> {
        let mut all: Vec<(String, AppDetail)> = self
            .apps
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
