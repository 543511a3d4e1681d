//! Ephemeral state for multi-panel selection prompts.
//!
//! When a shared dashboard has several panels, the user is asked to pick
//! one; the prompt's context lives here until the user answers, cancels,
//! or the entry expires. The cache is bounded by TTL and capacity so
//! abandoned prompts cannot accumulate forever.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use moka::future::Cache;
use rand::RngCore;
use std::time::Duration;
use thiserror::Error;

/// Context captured when a selection prompt is posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    /// The shared link, still HTML-entity encoded as Slack delivered it
    pub encoded_url: String,
    /// Channel the link was shared in
    pub channel: String,
    /// Timestamp of the message that shared the link
    pub message_ts: String,
}

/// Errors produced while consuming a selection token
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    /// The token is unknown: expired, already consumed, or never issued
    #[error("no pending panel selection found for the given token")]
    NotFound,
}

/// Bounded store of pending panel selections keyed by random token
#[derive(Clone)]
pub struct PendingSelections {
    cache: Cache<String, PendingSelection>,
}

impl PendingSelections {
    /// Creates a new store with the given TTL and capacity bounds.
    #[must_use]
    pub fn new(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self { cache }
    }

    /// Generate a fresh selection token: 32 random bytes, base64-encoded.
    #[must_use]
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    /// Store a pending selection under the given token.
    pub async fn insert(&self, token: String, selection: PendingSelection) {
        self.cache.insert(token, selection).await;
    }

    /// Consume a pending selection: exactly one caller gets the entry,
    /// any further attempt with the same token fails with `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError::NotFound`] if the token is unknown,
    /// expired, or was already consumed.
    pub async fn take(&self, token: &str) -> Result<PendingSelection, SelectionError> {
        self.cache
            .remove(token)
            .await
            .ok_or(SelectionError::NotFound)
    }

    /// Number of entries currently held.
    ///
    /// Useful for monitoring and health checks.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
