//! Tests for the concurrent aggregate store.

use std::sync::Arc;

use appmetrics::aggregate::record_http;
use appmetrics::store::AppStore;
use appmetrics::types::{AppDetail, AppKey};

#[test]
fn test_missing_key_is_absent() {
    let store = AppStore::new();
    assert!(store.get("o", "s", "a").is_none());
    assert!(store.is_empty());
}

#[test]
fn test_update_materializes_zero_valued_entry() {
    let store = AppStore::new();
    let key = AppKey::new("o", "s", "a");
    store.update(&key, |_| {});
    assert_eq!(store.get("o", "s", "a"), Some(AppDetail::default()));
    assert!(store.contains(&key));
}

#[test]
fn test_key_format() {
    assert_eq!(AppKey::new("org", "space", "app").as_str(), "org/space/app");
    assert_eq!(AppKey::new("", "", "").to_string(), "//");
}

#[test]
fn test_upsert_returns_previous() {
    let store = AppStore::new();
    let key = AppKey::new("o", "s", "a");
    assert!(store.upsert(&key, AppDetail::stub("g1", "a")).is_none());
    let prev = store.upsert(&key, AppDetail::stub("g2", "a")).unwrap();
    assert_eq!(prev.guid, "g1");
    assert_eq!(store.get_key(&key).unwrap().guid, "g2");
}

#[test]
fn test_compare_and_swap() {
    let store = AppStore::new();
    let key = AppKey::new("o", "s", "a");

    assert!(store.compare_and_swap(&key, None, AppDetail::stub("g1", "a")));
    assert!(!store.compare_and_swap(&key, None, AppDetail::stub("g2", "a")));

    let current = store.get_key(&key).unwrap();
    let stale = AppDetail::stub("other", "a");
    assert!(!store.compare_and_swap(&key, Some(&stale), AppDetail::stub("g3", "a")));
    assert!(store.compare_and_swap(&key, Some(&current), AppDetail::stub("g4", "a")));
    assert_eq!(store.get_key(&key).unwrap().guid, "g4");
}

#[test]
fn test_keys_and_snapshot_sorted() {
    let store = AppStore::new();
    for name in ["c", "a", "b"] {
        store.update(&AppKey::new("o", "s", name), |app| app.name = name.to_string());
    }
    assert_eq!(store.keys(), vec!["o/s/a", "o/s/b", "o/s/c"]);
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot[0].1.name, "a");
    assert_eq!(store.len(), 3);
}

#[test]
fn test_concurrent_updates_same_key_lose_nothing() {
    let store = Arc::new(AppStore::new());
    let key = AppKey::new("o", "s", "hot");
    let threads = 8;
    let per_thread = 1_000;

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            let key = key.clone();
            std::thread::spawn(move || {
                for _ in 0..per_thread {
                    store.update(&key, |app| app.event_count += 1);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(
        store.get_key(&key).unwrap().event_count,
        (threads * per_thread) as u64
    );
}

#[test]
fn test_concurrent_distinct_keys_match_serial() {
    let concurrent = Arc::new(AppStore::new());
    let serial = AppStore::new();
    let statuses = [200, 500, 404, 400, 201, 503];

    let handles: Vec<_> = (0..16)
        .map(|app| {
            let store = concurrent.clone();
            std::thread::spawn(move || {
                let key = AppKey::new("o", "s", &format!("app-{app}"));
                for round in 0..100 {
                    let status = statuses[(app + round) % statuses.len()];
                    store.update(&key, |detail| record_http(detail, status));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for app in 0..16 {
        let key = AppKey::new("o", "s", &format!("app-{app}"));
        for round in 0..100 {
            let status = statuses[(app + round) % statuses.len()];
            serial.update(&key, |detail| record_http(detail, status));
        }
    }

    assert_eq!(concurrent.snapshot(), serial.snapshot());
}
