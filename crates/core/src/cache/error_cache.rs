//! Negative-result cache for origin fetches.
//!
//! A failed fetch is remembered per key for twice the configured failure TTL.
//! Until the record expires every lookup short-circuits with the stored error and
//! the origin is not contacted. Expiry is fixed when the record is written; lookups
//! do not extend it.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use super::key::MediaKey;
use crate::Error;

/// Longest a failure record can live, whatever the TTL.
pub const MAX_FAILURE_RESIDENCY: Duration = Duration::from_secs(2 * 365 * 24 * 60 * 60);

/// A remembered failure.
#[derive(Debug, Clone)]
pub struct DownloadFailure {
    pub key: MediaKey,
    pub error: Error,
    pub recorded_at: Instant,
    pub expires_at: Instant,
}

impl DownloadFailure {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
struct Inner {
    ttl: Duration,
    failures: HashMap<MediaKey, DownloadFailure>,
}

/// In-memory failure cache.
///
/// Uses a HashMap behind a tokio RwLock; writers to the same key replace each
/// other, last write wins.
#[derive(Debug)]
pub struct ErrorCache {
    inner: RwLock<Inner>,
}

impl ErrorCache {
    /// Create a failure cache whose records live for `2 * ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self { inner: RwLock::new(Inner { ttl, failures: HashMap::new() }) }
    }

    /// Apply a reloaded failure TTL. Records already written keep their expiry.
    pub async fn set_ttl(&self, ttl: Duration) {
        self.inner.write().await.ttl = ttl;
    }

    /// Remember that fetching `key` failed with `error`.
    pub async fn record_failure(&self, key: MediaKey, error: Error) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let expires_at = now + inner.ttl.saturating_mul(2).min(MAX_FAILURE_RESIDENCY);

        tracing::debug!(%key, %error, "recording fetch failure");
        inner
            .failures
            .insert(key.clone(), DownloadFailure { key, error, recorded_at: now, expires_at });
    }

    /// The stored error for `key`, if a live record exists.
    pub async fn lookup(&self, key: &MediaKey) -> Option<Error> {
        let now = Instant::now();
        {
            let inner = self.inner.read().await;
            match inner.failures.get(key) {
                None => return None,
                Some(failure) if !failure.is_expired(now) => return Some(failure.error.clone()),
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().await;
        if inner.failures.get(key).is_some_and(|f| f.is_expired(now)) {
            inner.failures.remove(key);
        }
        None
    }

    /// The full record for `key`, including timestamps, if still live.
    pub async fn failure(&self, key: &MediaKey) -> Option<DownloadFailure> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner.failures.get(key).filter(|f| !f.is_expired(now)).cloned()
    }

    /// Delete every expired record.
    ///
    /// Returns the number of deleted records.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let before = inner.failures.len();
        inner.failures.retain(|_, failure| !failure.is_expired(now));
        before - inner.failures.len()
    }

    /// Number of records held, expired or not.
    pub async fn len(&self) -> usize {
        self.inner.read().await.failures.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    fn key(id: &str) -> MediaKey {
        MediaKey::remote("example.org", id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_returns_identical_error() {
        let cache = ErrorCache::new(TTL);
        let err = Error::NotFound("example.org/abc".into());
        cache.record_failure(key("abc"), err.clone()).await;

        assert_eq!(cache.lookup(&key("abc")).await, Some(err.clone()));
        assert_eq!(cache.lookup(&key("abc")).await, Some(err));
        assert_eq!(cache.lookup(&key("other")).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_lives_for_twice_the_ttl() {
        let cache = ErrorCache::new(TTL);
        cache.record_failure(key("abc"), Error::Upstream("status 502".into())).await;

        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        assert!(cache.lookup(&key("abc")).await.is_some());

        tokio::time::advance(TTL).await;
        assert!(cache.lookup(&key("abc")).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_capped() {
        let cache = ErrorCache::new(Duration::MAX);
        cache.record_failure(key("abc"), Error::NotFound("gone".into())).await;

        let failure = cache.failure(&key("abc")).await.unwrap();
        assert_eq!(failure.expires_at - failure.recorded_at, MAX_FAILURE_RESIDENCY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_does_not_extend_expiry() {
        let cache = ErrorCache::new(TTL);
        cache.record_failure(key("abc"), Error::Upstream("reset".into())).await;
        let failure = cache.failure(&key("abc")).await.unwrap();

        tokio::time::advance(TTL).await;
        assert!(cache.lookup(&key("abc")).await.is_some());
        assert_eq!(cache.failure(&key("abc")).await.unwrap().expires_at, failure.expires_at);

        tokio::time::advance(TTL).await;
        assert!(cache.lookup(&key("abc")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_write_wins() {
        let cache = ErrorCache::new(TTL);
        cache.record_failure(key("abc"), Error::Upstream("first".into())).await;
        cache.record_failure(key("abc"), Error::TooLarge("second".into())).await;

        assert_eq!(cache.lookup(&key("abc")).await, Some(Error::TooLarge("second".into())));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = ErrorCache::new(TTL);
        cache.record_failure(key("old"), Error::NotFound("old".into())).await;
        tokio::time::advance(TTL * 2).await;
        cache.record_failure(key("new"), Error::NotFound("new".into())).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert_eq!(cache.len().await, 1);
        assert!(cache.lookup(&key("new")).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_ttl_applies_to_new_records() {
        let cache = ErrorCache::new(TTL);
        cache.record_failure(key("old"), Error::NotFound("old".into())).await;
        cache.set_ttl(Duration::from_secs(5)).await;
        cache.record_failure(key("new"), Error::NotFound("new".into())).await;

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(cache.lookup(&key("old")).await.is_some());
        assert!(cache.lookup(&key("new")).await.is_none());
    }
}
