//! Popularity- and residency-bounded cache with single-flight fetches.
//!
//! ### Single flight
//! A miss starts the fetch on its own task and parks a shared handle to it under
//! the key. Every caller arriving before the fetch finishes awaits that handle, so
//! one origin request serves all of them. A caller that gives up only drops its
//! handle; the task keeps running and still populates the cache.
//!
//! ### Popularity
//! Each entry counts hits inside the current tracked window. The fetch that admits
//! an entry counts as one hit no matter how many callers shared it. When the
//! window rolls over every counter resets; `first_cached_at` never does.
//!
//! ### Eviction
//! An entry is cold once it has been resident for `min_residency` and has fewer
//! than `min_downloads` hits in the window. Only cold entries are evicted, oldest
//! first, and only while the aggregate size is over the ceiling. An evicted key is
//! not re-admitted for `min_evicted_residency`; requests in that interval go back to
//! the origin every time.
//!
//! The state lock is never held across an await.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::time::Instant;

use super::entry::CacheValue;
use super::key::MediaKey;
use super::policy::CachePolicy;
use crate::Error;

type Flight<V> = Shared<BoxFuture<'static, Result<V, Error>>>;

/// Residency bookkeeping for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStats {
    pub size: u64,
    pub first_cached_at: Instant,
    pub last_accessed_at: Instant,
    /// Hits in the current tracked window.
    pub window_hits: u64,
}

impl EntryStats {
    fn is_cold(&self, now: Instant, policy: &CachePolicy) -> bool {
        now.duration_since(self.first_cached_at) >= policy.min_residency && self.window_hits < policy.min_downloads
    }
}

struct Entry<V> {
    value: V,
    stats: EntryStats,
}

struct State<V> {
    entries: HashMap<MediaKey, Entry<V>>,
    in_flight: HashMap<MediaKey, Flight<V>>,
    /// When each recently evicted key left the cache.
    evicted: HashMap<MediaKey, Instant>,
    total_bytes: u64,
    window_started: Instant,
}

impl<V: CacheValue> State<V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            evicted: HashMap::new(),
            total_bytes: 0,
            window_started: Instant::now(),
        }
    }

    fn roll_window(&mut self, now: Instant, policy: &CachePolicy) {
        if now.duration_since(self.window_started) < policy.tracked_window {
            return;
        }
        for entry in self.entries.values_mut() {
            entry.stats.window_hits = 0;
        }
        self.window_started = now;
    }

    fn touch(&mut self, key: &MediaKey, now: Instant) -> Option<V> {
        let entry = self.entries.get_mut(key)?;
        entry.stats.window_hits += 1;
        entry.stats.last_accessed_at = now;
        Some(entry.value.clone())
    }

    fn over_ceiling(&self, incoming: u64, policy: &CachePolicy) -> bool {
        policy.max_size_bytes > 0 && self.total_bytes + incoming > policy.max_size_bytes
    }

    fn remove(&mut self, key: &MediaKey) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.stats.size;
        Some(entry)
    }

    /// Cold entries, oldest first, whose removal would let `incoming` more bytes
    /// fit. The flag is false when evicting every cold entry still leaves no room.
    fn eviction_plan(&self, incoming: u64, now: Instant, policy: &CachePolicy) -> (Vec<MediaKey>, bool) {
        let mut cold: Vec<(Instant, &MediaKey, u64)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.stats.is_cold(now, policy))
            .map(|(key, entry)| (entry.stats.first_cached_at, key, entry.stats.size))
            .collect();
        cold.sort();

        let mut remaining = self.total_bytes;
        let mut plan = Vec::new();
        for (_, key, size) in cold {
            if remaining.saturating_add(incoming) <= policy.max_size_bytes {
                break;
            }
            remaining -= size;
            plan.push(key.clone());
        }
        let fits = remaining.saturating_add(incoming) <= policy.max_size_bytes;
        (plan, fits)
    }

    fn evict(&mut self, keys: Vec<MediaKey>, now: Instant) -> usize {
        let mut evicted = 0;
        for key in keys {
            if self.remove(&key).is_some() {
                tracing::debug!(%key, "evicted cold entry");
                self.evicted.insert(key, now);
                evicted += 1;
            }
        }
        evicted
    }

    /// Evict cold entries, oldest first, while the aggregate size is over the ceiling.
    fn sweep(&mut self, now: Instant, policy: &CachePolicy) -> usize {
        self.evicted
            .retain(|_, evicted_at| now.duration_since(*evicted_at) < policy.min_evicted_residency);

        if !self.over_ceiling(0, policy) {
            return 0;
        }
        let (plan, _) = self.eviction_plan(0, now, policy);
        self.evict(plan, now)
    }

    /// Store a freshly fetched value if policy allows. Returns whether it was stored.
    fn admit(&mut self, key: MediaKey, value: V, now: Instant, policy: &CachePolicy) -> bool {
        let size = value.size_bytes();
        if !policy.admits_size(size) {
            tracing::debug!(%key, size, max = policy.max_entry_bytes, "entry over per-entry ceiling, not caching");
            return false;
        }

        if let Some(evicted_at) = self.evicted.get(&key) {
            if now.duration_since(*evicted_at) < policy.min_evicted_residency {
                tracing::debug!(%key, "recently evicted, not re-admitting yet");
                return false;
            }
            self.evicted.remove(&key);
        }

        self.remove(&key);

        if self.over_ceiling(size, policy) {
            let (plan, fits) = self.eviction_plan(size, now, policy);
            if !fits {
                tracing::debug!(%key, size, total = self.total_bytes, "no evictable room, not caching");
                return false;
            }
            self.evict(plan, now);
        }

        self.total_bytes += size;
        self.entries.insert(
            key,
            Entry { value, stats: EntryStats { size, first_cached_at: now, last_accessed_at: now, window_hits: 1 } },
        );
        true
    }
}

/// Clears the in-flight slot if a fetch task ends without reaching completion.
struct FlightGuard<V: CacheValue> {
    state: Arc<Mutex<State<V>>>,
    key: Option<MediaKey>,
}

impl<V: CacheValue> FlightGuard<V> {
    fn disarm(mut self) {
        self.key = None;
    }
}

impl<V: CacheValue> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            lock(&self.state).in_flight.remove(&key);
        }
    }
}

fn lock<V>(state: &Mutex<State<V>>) -> MutexGuard<'_, State<V>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Write-through cache of fetched values keyed by [`MediaKey`].
///
/// Every operation takes the [`CachePolicy`] in force for that operation, so a
/// configuration reload only affects operations that start after it.
pub struct MediaCache<V: CacheValue> {
    name: &'static str,
    state: Arc<Mutex<State<V>>>,
}

impl<V: CacheValue> MediaCache<V> {
    /// Create an empty cache. `name` labels its log lines.
    pub fn new(name: &'static str) -> Self {
        Self { name, state: Arc::new(Mutex::new(State::new())) }
    }

    /// Return the cached value for `key`, or run `fetch` to produce it.
    ///
    /// Concurrent callers for the same key share one execution of `fetch` and
    /// observe the identical result. Failures are returned but never stored.
    pub async fn get_or_fetch<F, Fut>(&self, key: &MediaKey, policy: &CachePolicy, fetch: F) -> Result<V, Error>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let flight = {
            let mut state = lock(&self.state);
            let now = Instant::now();
            state.roll_window(now, policy);

            if policy.enabled
                && let Some(value) = state.touch(key, now)
            {
                tracing::debug!(cache = self.name, %key, "cache hit");
                return Ok(value);
            }

            match state.in_flight.get(key) {
                Some(flight) => {
                    tracing::debug!(cache = self.name, %key, "joining in-flight fetch");
                    flight.clone()
                }
                None => {
                    tracing::debug!(cache = self.name, %key, "cache miss, fetching");
                    let flight = self.start_flight(key.clone(), policy.clone(), fetch);
                    state.in_flight.insert(key.clone(), flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    fn start_flight<F, Fut>(&self, key: MediaKey, policy: CachePolicy, fetch: F) -> Flight<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<V, Error>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let name = self.name;

        let task = tokio::spawn(async move {
            let guard = FlightGuard { state: Arc::clone(&state), key: Some(key.clone()) };
            let result = fetch().await;

            {
                let mut state = lock(&state);
                state.in_flight.remove(&key);
                if policy.enabled
                    && let Ok(value) = &result
                {
                    let now = Instant::now();
                    state.roll_window(now, &policy);
                    if state.admit(key.clone(), value.clone(), now, &policy) {
                        tracing::debug!(cache = name, %key, total_bytes = state.total_bytes, "stored");
                    }
                }
            }
            guard.disarm();

            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(Error::Upstream(format!("fetch task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Look up `key`, counting a hit if present.
    pub fn get(&self, key: &MediaKey, policy: &CachePolicy) -> Option<V> {
        if !policy.enabled {
            return None;
        }
        let mut state = lock(&self.state);
        let now = Instant::now();
        state.roll_window(now, policy);
        state.touch(key, now)
    }

    /// Count a hit on `key`. Returns false if the key is not cached.
    pub fn touch(&self, key: &MediaKey, policy: &CachePolicy) -> bool {
        self.get(key, policy).is_some()
    }

    /// Evict cold entries until the aggregate size fits the ceiling.
    ///
    /// With caching disabled every entry is dropped. Returns the number of
    /// evicted entries.
    pub fn eviction_sweep(&self, policy: &CachePolicy) -> usize {
        let mut state = lock(&self.state);
        let now = Instant::now();

        if !policy.enabled {
            let dropped = state.entries.len();
            state.entries.clear();
            state.evicted.clear();
            state.total_bytes = 0;
            return dropped;
        }

        state.roll_window(now, policy);
        let evicted = state.sweep(now, policy);
        if evicted > 0 {
            tracing::info!(cache = self.name, evicted, total_bytes = state.total_bytes, "eviction sweep");
        }
        evicted
    }

    /// Residency bookkeeping for `key`, without counting a hit.
    pub fn stats(&self, key: &MediaKey) -> Option<EntryStats> {
        lock(&self.state).entries.get(key).map(|entry| entry.stats)
    }

    pub fn contains(&self, key: &MediaKey) -> bool {
        lock(&self.state).entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate size of stored entries.
    pub fn total_bytes(&self) -> u64 {
        lock(&self.state).total_bytes
    }
}
