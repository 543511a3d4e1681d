//! Background deletion of expired cached images.
//!
//! A recurring task lists everything under the storage root and deletes
//! objects whose `LastModified` precedes `now - retention`. Ticks are
//! single-flight: a tick that fires while a sweep is still running is
//! skipped.

use crate::config::RetentionWindow;
use crate::storage::{ObjectStore, StorageError, StoredObject};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Periodically sweeps expired images out of the store
pub struct RetentionSweeper {
    store: Arc<dyn ObjectStore>,
    window: RetentionWindow,
    in_progress: AtomicBool,
}

impl RetentionSweeper {
    /// Create a sweeper over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, window: RetentionWindow) -> Arc<Self> {
        Arc::new(Self {
            store,
            window,
            in_progress: AtomicBool::new(false),
        })
    }

    /// Spawn the recurring sweep task.
    ///
    /// The task runs until `shutdown` is cancelled; a tick's failure is
    /// logged and never terminates the timer.
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweeper.window.cleanup_interval);
            // The first tick of a tokio interval completes immediately;
            // consume it so sweeps start one full period after startup.
            interval.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("Retention sweeper shutting down");
                        return;
                    }
                    _ = interval.tick() => sweeper.run_once().await,
                }
            }
        })
    }

    /// Run a single guarded sweep: skip entirely if one is in flight.
    pub async fn run_once(&self) {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Cleanup already in progress, not starting another one.");
            return;
        }

        let result = self.sweep().await;
        // The flag must clear on every exit path
        self.in_progress.store(false, Ordering::Release);

        match result {
            Ok(deleted) => info!("Cleanup: Deleted {deleted} images"),
            Err(e) => error!("Cleanup failed: {e}"),
        }
    }

    /// List, filter, and delete expired objects.
    ///
    /// Every eligible deletion is attempted; failures are reported after
    /// all deletions have settled.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if listing fails or any deletion failed.
    pub async fn sweep(&self) -> Result<usize, StorageError> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.window.retention.as_secs().cast_signed());
        let objects = self.store.list().await?;
        let doomed = expired_keys(&objects, self.store.root(), cutoff);

        let results = join_all(doomed.iter().map(|key| self.store.delete(key))).await;
        let mut deleted = 0usize;
        let mut failures = 0usize;
        for (key, result) in doomed.iter().zip(results) {
            match result {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failures += 1;
                    warn!("Cleanup: Failed to delete {key}: {e}");
                }
            }
        }
        if failures > 0 {
            return Err(StorageError::Delete(format!(
                "{failures} of {} deletions failed ({deleted} succeeded)",
                doomed.len()
            )));
        }
        Ok(deleted)
    }
}

/// Select the keys eligible for deletion: past the cutoff, never the root
/// marker itself. Entries without a key are skipped with a warning.
#[must_use]
pub fn expired_keys(
    objects: &[StoredObject],
    root: &str,
    cutoff: DateTime<Utc>,
) -> Vec<String> {
    objects
        .iter()
        .filter_map(|object| {
            let Some(key) = &object.key else {
                warn!("Cleanup: Received object without key {object:?}");
                return None;
            };
            if key == root {
                return None;
            }
            match object.last_modified {
                Some(modified) if modified < cutoff => Some(key.clone()),
                _ => None,
            }
        })
        .collect()
}
