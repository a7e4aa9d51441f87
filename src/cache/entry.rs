use super::key::CacheKey;
use crate::core::{ApiError, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Re-runnable loader remembered by an entry so it can be refetched after
/// invalidation without the original caller.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Lifecycle of one cache key
///
/// ```text
/// Idle ──read──> Pending ──> Success | Error
///                  ^              │
///                  └─invalidate / refetch─┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Idle,
    Pending,
    Success,
    Error,
}

pub(crate) struct CacheEntry {
    pub(crate) key: CacheKey,
    pub(crate) status: EntryStatus,
    pub(crate) value: Option<Value>,
    pub(crate) error: Option<ApiError>,
    pub(crate) subscribers: usize,
    pub(crate) created_at: Instant,
    pub(crate) updated_at: Option<Instant>,
    pub(crate) last_accessed: Instant,
    pub(crate) invalidated: bool,
    pub(crate) version: u64,
    pub(crate) fetcher: Option<Fetcher>,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey) -> Self {
        let now = Instant::now();
        Self {
            key,
            status: EntryStatus::Idle,
            value: None,
            error: None,
            subscribers: 0,
            created_at: now,
            updated_at: None,
            last_accessed: now,
            invalidated: false,
            version: 0,
            fetcher: None,
        }
    }

    pub(crate) fn is_fresh(&self, stale_time: Duration) -> bool {
        self.status == EntryStatus::Success
            && !self.invalidated
            && self
                .updated_at
                .is_some_and(|updated| updated.elapsed() < stale_time)
    }

    /// Status to fall back to once a pending fetch is abandoned.
    pub(crate) fn settled_status(&self) -> EntryStatus {
        if self.value.is_some() {
            EntryStatus::Success
        } else if self.error.is_some() {
            EntryStatus::Error
        } else {
            EntryStatus::Idle
        }
    }

    pub(crate) fn info(&self, stale_time: Duration, fetching: bool) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            status: self.status,
            has_value: self.value.is_some(),
            error: self.error.clone(),
            subscribers: self.subscribers,
            version: self.version,
            is_stale: !self.is_fresh(stale_time),
            is_fetching: fetching,
            age: self.created_at.elapsed(),
        }
    }
}

/// Read-only view of an entry for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub status: EntryStatus,
    pub has_value: bool,
    pub error: Option<ApiError>,
    pub subscribers: usize,
    pub version: u64,
    pub is_stale: bool,
    pub is_fetching: bool,
    pub age: Duration,
}

/// Why a non-blocking read has no value to show yet.
#[derive(Debug, Clone, PartialEq)]
pub enum NotReady {
    /// Nothing has been requested for the key.
    Idle,
    /// The first fetch is still running.
    Pending,
    /// The last fetch failed and there is no earlier value.
    Failed(ApiError),
}

impl NotReady {
    pub fn is_pending(&self) -> bool {
        matches!(self, NotReady::Pending)
    }
}

/// Change notification broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Fetching(CacheKey),
    Updated(CacheKey),
    Invalidated(CacheKey),
    Cancelled(CacheKey),
    Removed(CacheKey),
    Cleared,
}

impl CacheEvent {
    /// `true` when the event concerns `key` (a full clear concerns every key).
    pub fn affects(&self, key: &CacheKey) -> bool {
        match self {
            CacheEvent::Fetching(k)
            | CacheEvent::Updated(k)
            | CacheEvent::Invalidated(k)
            | CacheEvent::Cancelled(k)
            | CacheEvent::Removed(k) => k == key,
            CacheEvent::Cleared => true,
        }
    }
}
