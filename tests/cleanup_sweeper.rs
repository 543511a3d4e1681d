//! Retention sweeper invariants, driven against an in-memory store.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use grafana_unfurl::cleanup::RetentionSweeper;
use grafana_unfurl::config::RetentionWindow;
use grafana_unfurl::storage::{ObjectStore, StorageError, StoredObject};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockStore {
    root: String,
    objects: Vec<StoredObject>,
    deleted: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    list_delay: Duration,
    failing_keys: HashSet<String>,
}

impl MockStore {
    fn new(root: &str, objects: Vec<StoredObject>) -> Self {
        Self {
            root: root.to_string(),
            objects,
            deleted: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            list_delay: Duration::from_millis(0),
            failing_keys: HashSet::new(),
        }
    }

    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("deleted lock").clone()
    }
}

#[async_trait]
impl ObjectStore for MockStore {
    fn root(&self) -> &str {
        &self.root
    }

    async fn list(&self) -> Result<Vec<StoredObject>, StorageError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        Ok(self.objects.clone())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if self.failing_keys.contains(key) {
            return Err(StorageError::Delete(format!("synthetic failure for {key}")));
        }
        self.deleted
            .lock()
            .expect("deleted lock")
            .push(key.to_string());
        Ok(())
    }
}

fn window(retention_secs: u64) -> RetentionWindow {
    RetentionWindow {
        retention: Duration::from_secs(retention_secs),
        cleanup_interval: Duration::from_secs(3600),
    }
}

fn object(key: &str, age_secs: i64) -> StoredObject {
    StoredObject {
        key: Some(key.to_string()),
        last_modified: Some(Utc::now() - ChronoDuration::seconds(age_secs)),
    }
}

#[tokio::test]
async fn sweep_deletes_expired_objects_only() {
    let store = Arc::new(MockStore::new(
        "grafana/",
        vec![
            object("grafana/20230101000000000.png", 500),
            object("grafana/20240101000000000.png", 10),
        ],
    ));
    let sweeper = RetentionSweeper::new(store.clone(), window(100));

    let deleted = sweeper.sweep().await.expect("sweep succeeds");
    assert_eq!(deleted, 1);
    assert_eq!(store.deleted(), vec!["grafana/20230101000000000.png"]);
}

#[tokio::test]
async fn sweep_never_deletes_the_root_marker() {
    let store = Arc::new(MockStore::new(
        "grafana/",
        vec![object("grafana/", 99999), object("grafana/a.png", 99999)],
    ));
    let sweeper = RetentionSweeper::new(store.clone(), window(100));

    sweeper.sweep().await.expect("sweep succeeds");
    assert_eq!(store.deleted(), vec!["grafana/a.png"]);
}

#[tokio::test]
async fn sweep_skips_keyless_listing_entries() {
    let store = Arc::new(MockStore::new(
        "grafana/",
        vec![
            StoredObject {
                key: None,
                last_modified: Some(Utc::now() - ChronoDuration::seconds(99999)),
            },
            object("grafana/b.png", 99999),
        ],
    ));
    let sweeper = RetentionSweeper::new(store.clone(), window(100));

    let deleted = sweeper.sweep().await.expect("sweep succeeds");
    assert_eq!(deleted, 1);
    assert_eq!(store.deleted(), vec!["grafana/b.png"]);
}

#[tokio::test]
async fn failed_deletions_do_not_block_siblings() {
    let mut store = MockStore::new(
        "grafana/",
        vec![
            object("grafana/a.png", 99999),
            object("grafana/b.png", 99999),
            object("grafana/c.png", 99999),
        ],
    );
    store.failing_keys.insert("grafana/b.png".to_string());
    let store = Arc::new(store);
    let sweeper = RetentionSweeper::new(store.clone(), window(100));

    // The tick reports the failure, after attempting every deletion
    let result = sweeper.sweep().await;
    assert!(result.is_err());
    let deleted = store.deleted();
    assert!(deleted.contains(&"grafana/a.png".to_string()));
    assert!(deleted.contains(&"grafana/c.png".to_string()));
}

#[tokio::test]
async fn concurrent_ticks_are_single_flight() {
    let mut store = MockStore::new("grafana/", vec![object("grafana/a.png", 99999)]);
    store.list_delay = Duration::from_millis(200);
    let store = Arc::new(store);
    let sweeper = RetentionSweeper::new(store.clone(), window(100));

    // Two ticks run concurrently; the second must skip while the first
    // still holds the in-progress flag.
    tokio::join!(sweeper.run_once(), sweeper.run_once());
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 1);

    // Once the flag clears, the next tick sweeps again
    sweeper.run_once().await;
    assert_eq!(store.list_calls.load(Ordering::SeqCst), 2);
}
