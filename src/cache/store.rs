// ============================================================================
// Query Cache
// ============================================================================
//
// Keyed store of asynchronous results shared by every reader and mutation.
//
// - At most one fetch per key is in flight; concurrent readers await the same
//   `Shared` future.
// - Each fetch carries an id. A response is applied only while its fetch is
//   still the registered one, so cancelled or superseded responses are
//   dropped.
// - Every write bumps a monotonically increasing version, which the mutation
//   controller uses to detect concurrent writers.
//
// The lock is never held across an await point.
//
// ============================================================================

use super::entry::{CacheEntry, CacheEvent, EntryInfo, EntryStatus, Fetcher, NotReady};
use super::key::{CacheKey, KeyFilter};
use super::retry::RetryPolicy;
use crate::connection::ClientConfig;
use crate::core::{ApiError, Result};
use futures::FutureExt;
use futures::future::{AbortHandle, BoxFuture, Shared, abortable, join_all};
use lru::LruCache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

const EVENT_CAPACITY: usize = 256;

type SharedFetch = Shared<BoxFuture<'static, Result<Value>>>;

struct InFlight {
    id: u64,
    future: SharedFetch,
    abort: AbortHandle,
    /// Invalidated while running; the result lands stale.
    invalidated: bool,
}

struct CacheState {
    entries: LruCache<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, InFlight>,
    next_fetch_id: u64,
    next_version: u64,
}

impl CacheState {
    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

pub struct QueryCache {
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
    stale_time: Duration,
    gc_time: Duration,
    max_entries: usize,
    retry: RetryPolicy,
}

impl QueryCache {
    pub fn new(config: &ClientConfig) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                in_flight: HashMap::new(),
                next_fetch_id: 0,
                next_version: 0,
            }),
            events,
            stale_time: config.stale_time,
            gc_time: config.gc_time,
            max_entries: config.max_entries.max(1),
            retry: config.retry,
        })
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: CacheEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Entry for `key`, created (and capacity enforced) when missing.
    fn entry_mut<'a>(&self, state: &'a mut CacheState, key: &CacheKey) -> &'a mut CacheEntry {
        if !state.entries.contains(key) {
            self.evict_for_insert(state);
        }
        state
            .entries
            .get_or_insert_mut(key.clone(), || CacheEntry::new(key.clone()))
    }

    fn evict_for_insert(&self, state: &mut CacheState) {
        while state.entries.len() >= self.max_entries {
            let victim = state
                .entries
                .iter()
                .rev()
                .find(|(key, entry)| entry.subscribers == 0 && !state.in_flight.contains_key(*key))
                .map(|(key, _)| key.clone());
            let Some(victim) = victim else {
                break;
            };
            state.entries.pop(&victim);
            event!(Level::DEBUG, key = %victim, "evicted least recently used entry");
            self.emit(CacheEvent::Removed(victim));
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Return the cached value when fresh, otherwise fetch it once for all
    /// concurrent callers of the same key.
    pub async fn read_value(self: &Arc<Self>, key: CacheKey, fetcher: Fetcher) -> Result<Value> {
        let shared = {
            let mut state = self.lock();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.last_accessed = Instant::now();
                entry.fetcher = Some(fetcher.clone());
                if entry.is_fresh(self.stale_time) {
                    if let Some(value) = &entry.value {
                        return Ok(value.clone());
                    }
                }
            }

            let joined = state.in_flight.get(&key).map(|in_flight| in_flight.future.clone());
            match joined {
                Some(future) => {
                    event!(Level::TRACE, key = %key, "joining in-flight fetch");
                    future
                }
                None => self.start_fetch(&mut state, &key, fetcher),
            }
        };

        shared.await
    }

    fn start_fetch(self: &Arc<Self>, state: &mut CacheState, key: &CacheKey, fetcher: Fetcher) -> SharedFetch {
        state.next_fetch_id += 1;
        let fetch_id = state.next_fetch_id;

        let retry = self.retry;
        let label = key.to_string();
        let loader = fetcher.clone();
        let attempt = async move { retry.run(&label, || loader()).await };
        let (attempt, abort) = abortable(attempt);

        let cache = Arc::downgrade(self);
        let settle_key = key.clone();
        let resource = key.scope().to_string();
        let span = info_span!("cache.fetch", key = %key, fetch_id = fetch_id);
        let future = async move {
            let outcome = match attempt.await {
                Ok(outcome) => outcome,
                Err(_aborted) => return Err(ApiError::cancelled(&resource)),
            };
            if let Some(cache) = cache.upgrade() {
                cache.settle(&settle_key, fetch_id, &outcome);
            }
            outcome
        }
        .instrument(span)
        .boxed()
        .shared();

        let entry = self.entry_mut(state, key);
        entry.status = EntryStatus::Pending;
        entry.fetcher = Some(fetcher);
        entry.last_accessed = Instant::now();

        state.in_flight.insert(
            key.clone(),
            InFlight {
                id: fetch_id,
                future: future.clone(),
                abort,
                invalidated: false,
            },
        );
        self.emit(CacheEvent::Fetching(key.clone()));
        future
    }

    fn settle(&self, key: &CacheKey, fetch_id: u64, outcome: &Result<Value>) {
        let mut state = self.lock();
        match state.in_flight.get(key) {
            Some(in_flight) if in_flight.id == fetch_id => {}
            _ => {
                event!(Level::DEBUG, key = %key, fetch_id = fetch_id, "discarding superseded response");
                return;
            }
        }
        let invalidated = state
            .in_flight
            .remove(key)
            .is_some_and(|in_flight| in_flight.invalidated);

        let version = state.bump_version();
        let Some(entry) = state.entries.peek_mut(key) else {
            return;
        };
        match outcome {
            Ok(value) => {
                entry.value = Some(value.clone());
                entry.error = None;
                entry.status = EntryStatus::Success;
                entry.updated_at = Some(Instant::now());
                entry.invalidated = invalidated;
            }
            Err(err) => {
                event!(Level::WARN, key = %key, error = %err, "fetch failed");
                entry.error = Some(err.clone());
                entry.status = EntryStatus::Error;
            }
        }
        entry.version = version;
        drop(state);

        self.emit(CacheEvent::Updated(key.clone()));
    }

    /// Typed [`QueryCache::read_value`]: the loader's result is stored as JSON
    /// and decoded for the caller.
    pub async fn read<T, F, Fut>(self: &Arc<Self>, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let resource = key.scope().to_string();
        let fetcher: Fetcher = Arc::new(move || {
            let pending = fetch();
            let resource = resource.clone();
            async move {
                let value = pending.await?;
                serde_json::to_value(&value).map_err(|e| ApiError::decode(&resource, e.to_string()))
            }
            .boxed()
        });

        let value = self.read_value(key.clone(), fetcher).await?;
        decode(&key, value)
    }

    /// Current value without fetching; a value is returned even while a
    /// refetch is running.
    pub fn peek(&self, key: &CacheKey) -> std::result::Result<Value, NotReady> {
        let state = self.lock();
        let Some(entry) = state.entries.peek(key) else {
            return Err(NotReady::Idle);
        };
        if let Some(value) = &entry.value {
            return Ok(value.clone());
        }
        match (&entry.error, entry.status) {
            (_, EntryStatus::Pending) => Err(NotReady::Pending),
            (Some(err), _) => Err(NotReady::Failed(err.clone())),
            _ => Err(NotReady::Idle),
        }
    }

    pub fn peek_as<T: DeserializeOwned>(&self, key: &CacheKey) -> std::result::Result<T, NotReady> {
        let value = self.peek(key)?;
        decode(key, value).map_err(NotReady::Failed)
    }

    pub fn get_data(&self, key: &CacheKey) -> Option<Value> {
        self.lock().entries.peek(key).and_then(|entry| entry.value.clone())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.get_data(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn version(&self, key: &CacheKey) -> Option<u64> {
        self.lock().entries.peek(key).map(|entry| entry.version)
    }

    pub fn info(&self, key: &CacheKey) -> Option<EntryInfo> {
        let state = self.lock();
        let fetching = state.in_flight.contains_key(key);
        state
            .entries
            .peek(key)
            .map(|entry| entry.info(self.stale_time, fetching))
    }

    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    pub fn keys_matching(&self, filter: &KeyFilter) -> Vec<CacheKey> {
        self.lock()
            .entries
            .iter()
            .filter(|(key, _)| filter.matches(key))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Synchronously replace the value of `key`. Visible to every reader
    /// immediately; no network call. Returns the new version.
    pub fn set_data(&self, key: &CacheKey, value: Value) -> u64 {
        let mut state = self.lock();
        let version = state.bump_version();
        let entry = self.entry_mut(&mut state, key);
        let now = Instant::now();
        entry.value = Some(value);
        entry.error = None;
        entry.status = EntryStatus::Success;
        entry.updated_at = Some(now);
        entry.last_accessed = now;
        entry.invalidated = false;
        entry.version = version;
        drop(state);

        self.emit(CacheEvent::Updated(key.clone()));
        version
    }

    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) -> Result<u64> {
        let value = serde_json::to_value(value)
            .map_err(|e| ApiError::decode(key.scope(), e.to_string()))?;
        Ok(self.set_data(key, value))
    }

    /// Edit the value of `key` in place. Returns the new version, or `None`
    /// when the key holds no value.
    pub fn update_data<F>(&self, key: &CacheKey, edit: F) -> Option<u64>
    where
        F: FnOnce(&mut Value),
    {
        let mut state = self.lock();
        let version = state.bump_version();
        let entry = state.entries.peek_mut(key)?;
        let value = entry.value.as_mut()?;
        edit(value);
        entry.version = version;
        entry.last_accessed = Instant::now();
        drop(state);

        self.emit(CacheEvent::Updated(key.clone()));
        Some(version)
    }

    /// Drop an entry, aborting its fetch.
    pub fn remove(&self, key: &CacheKey) -> Option<Value> {
        let mut state = self.lock();
        if let Some(in_flight) = state.in_flight.remove(key) {
            in_flight.abort.abort();
        }
        let removed = state.entries.pop(key)?;
        drop(state);

        self.emit(CacheEvent::Removed(key.clone()));
        removed.value
    }

    /// Mark matching entries stale; the next read (or `refetch_active`)
    /// fetches them again. A fetch already running for a matching key stores
    /// its result as stale. Returns the number of entries marked.
    pub fn invalidate(&self, filter: &KeyFilter) -> usize {
        let mut state = self.lock();
        for (key, in_flight) in state.in_flight.iter_mut() {
            if filter.matches(key) {
                in_flight.invalidated = true;
            }
        }
        let mut marked = Vec::new();
        for (key, entry) in state.entries.iter_mut() {
            if filter.matches(key) {
                entry.invalidated = true;
                marked.push(key.clone());
            }
        }
        drop(state);

        event!(Level::DEBUG, count = marked.len(), "invalidated cache entries");
        let count = marked.len();
        for key in marked {
            self.emit(CacheEvent::Invalidated(key));
        }
        count
    }

    /// Refetch invalidated entries that have subscribers and a remembered
    /// loader. Failures are stored in the entries. Returns how many were
    /// refetched.
    pub async fn refetch_active(self: &Arc<Self>, filter: &KeyFilter) -> usize {
        let targets: Vec<(CacheKey, Fetcher)> = {
            let state = self.lock();
            state
                .entries
                .iter()
                .filter(|(key, entry)| {
                    filter.matches(key) && entry.subscribers > 0 && !entry.is_fresh(self.stale_time)
                })
                .filter_map(|(key, entry)| entry.fetcher.clone().map(|f| (key.clone(), f)))
                .collect()
        };

        let count = targets.len();
        join_all(
            targets
                .into_iter()
                .map(|(key, fetcher)| self.read_value(key, fetcher)),
        )
        .await;
        count
    }

    /// Abort the in-flight fetch of `key`. Readers waiting on it receive
    /// [`ApiError::Cancelled`]; its response, if it still arrives, is dropped.
    pub fn cancel(&self, key: &CacheKey) -> bool {
        let mut state = self.lock();
        let Some(in_flight) = state.in_flight.remove(key) else {
            return false;
        };
        in_flight.abort.abort();
        if let Some(entry) = state.entries.peek_mut(key) {
            entry.status = entry.settled_status();
        }
        drop(state);

        event!(Level::DEBUG, key = %key, "cancelled in-flight fetch");
        self.emit(CacheEvent::Cancelled(key.clone()));
        true
    }

    /// Drop everything (logout / session expiry).
    pub fn clear(&self) {
        let mut state = self.lock();
        for (_, in_flight) in state.in_flight.drain() {
            in_flight.abort.abort();
        }
        state.entries.clear();
        drop(state);

        event!(Level::INFO, "query cache cleared");
        self.emit(CacheEvent::Cleared);
    }

    // ------------------------------------------------------------------------
    // Subscriptions and garbage collection
    // ------------------------------------------------------------------------

    /// Register interest in `key`. While the returned guard lives the entry is
    /// never garbage-collected or evicted.
    pub fn subscribe(self: &Arc<Self>, key: &CacheKey) -> Subscription {
        let events = self.events.subscribe();
        {
            let mut state = self.lock();
            let entry = self.entry_mut(&mut state, key);
            entry.subscribers += 1;
            entry.last_accessed = Instant::now();
        }
        Subscription {
            cache: Arc::clone(self),
            key: key.clone(),
            events,
        }
    }

    fn unsubscribe(&self, key: &CacheKey) {
        let mut state = self.lock();
        if let Some(entry) = state.entries.peek_mut(key) {
            entry.subscribers = entry.subscribers.saturating_sub(1);
            entry.last_accessed = Instant::now();
        }
    }

    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Remove entries idle for at least `gc_time` with no subscribers and no
    /// fetch in flight. Returns the number removed.
    pub fn collect_garbage(&self) -> usize {
        let mut state = self.lock();
        let expired: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                entry.subscribers == 0
                    && !state.in_flight.contains_key(*key)
                    && entry.last_accessed.elapsed() >= self.gc_time
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.entries.pop(key);
        }
        drop(state);

        if !expired.is_empty() {
            event!(Level::DEBUG, count = expired.len(), "garbage-collected idle entries");
        }
        let count = expired.len();
        for key in expired {
            self.emit(CacheEvent::Removed(key));
        }
        count
    }

    /// Run [`QueryCache::collect_garbage`] every `interval` until the cache is
    /// dropped.
    pub fn spawn_gc(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.collect_garbage();
                    }
                    None => break,
                }
            }
        })
    }
}

fn decode<T: DeserializeOwned>(key: &CacheKey, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| ApiError::decode(key.scope(), e.to_string()))
}

/// Active interest in one cache key.
pub struct Subscription {
    cache: Arc<QueryCache>,
    key: CacheKey,
    events: broadcast::Receiver<CacheEvent>,
}

impl Subscription {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Wait for the next change of this key. Returns `None` once the cache is
    /// gone.
    pub async fn changed(&mut self) -> Option<CacheEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) if event.affects(&self.key) => return Some(event),
                Ok(_) => continue,
                // Missed events may have touched the key.
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    return Some(CacheEvent::Invalidated(self.key.clone()));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache_with(stale: Duration) -> Arc<QueryCache> {
        let config = ClientConfig::default()
            .stale_time(stale)
            .gc_time(Duration::ZERO)
            .retry(RetryPolicy::none());
        QueryCache::new(&config)
    }

    #[tokio::test]
    async fn test_fresh_value_served_without_fetch() {
        let cache = cache_with(Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::accounts();

        for _ in 0..3 {
            let calls = calls.clone();
            let value: Vec<u32> = cache
                .read(key.clone(), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok(vec![1, 2]) }
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_data_bumps_version() {
        let cache = cache_with(Duration::from_secs(60));
        let key = CacheKey::accounts();
        assert_eq!(cache.update_data(&key, |_| {}), None);

        let v1 = cache.set_data(&key, json!([1]));
        let v2 = cache
            .update_data(&key, |value| {
                if let Some(items) = value.as_array_mut() {
                    items.push(json!(2));
                }
            })
            .unwrap();
        assert!(v2 > v1);
        assert_eq!(cache.get_data(&key), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn test_invalidate_during_fetch_lands_stale() {
        let cache = cache_with(Duration::from_secs(60));
        let key = CacheKey::categories();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();
        let gate = Arc::new(Mutex::new(Some(gate)));

        let read = cache.read(key.clone(), move || {
            let gate = gate.lock().unwrap().take();
            async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(vec![1u32])
            }
        });
        let (value, _) = tokio::join!(read, async {
            tokio::task::yield_now().await;
            assert!(cache.is_fetching(&key));
            cache.invalidate(&KeyFilter::Exact(key.clone()));
            let _ = release.send(());
        });

        assert_eq!(value.unwrap(), vec![1]);
        assert!(cache.info(&key).unwrap().is_stale);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let config = ClientConfig::default().max_entries(2);
        let cache = QueryCache::new(&config);
        cache.set_data(&CacheKey::account(1), json!(1));
        cache.set_data(&CacheKey::account(2), json!(2));
        let _keep = cache.subscribe(&CacheKey::account(1));
        cache.set_data(&CacheKey::account(3), json!(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get_data(&CacheKey::account(1)).is_some());
        assert!(cache.get_data(&CacheKey::account(2)).is_none());
    }

    #[tokio::test]
    async fn test_gc_skips_subscribed_entries() {
        let cache = cache_with(Duration::from_secs(60));
        cache.set_data(&CacheKey::account(1), json!(1));
        cache.set_data(&CacheKey::account(2), json!(2));
        let subscription = cache.subscribe(&CacheKey::account(2));

        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.get_data(&CacheKey::account(2)).is_some());

        drop(subscription);
        assert_eq!(cache.collect_garbage(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_peek_reports_state() {
        let cache = cache_with(Duration::from_secs(60));
        let key = CacheKey::categories();
        assert_eq!(cache.peek(&key), Err(NotReady::Idle));

        let result: Result<Vec<u32>> = cache
            .read(key.clone(), || async {
                Err(ApiError::from_status(500, "category", "boom"))
            })
            .await;
        assert!(result.is_err());
        assert!(matches!(cache.peek(&key), Err(NotReady::Failed(_))));

        cache.set_data(&key, json!([]));
        assert_eq!(cache.peek(&key), Ok(json!([])));
    }
}
