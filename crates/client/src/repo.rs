//! The retrieval engine as seen by callers.
//!
//! [`MediaRepo`] wires the failure cache, the two positive caches, the remote
//! fetcher and the preview extractor together. Every operation takes one
//! configuration snapshot when it starts and uses it throughout.

use std::sync::Arc;

use serde::Serialize;

use mediarepo_core::config::ConfigError;
use mediarepo_core::{
    AppConfig, CachePolicy, CachedMedia, Error, ErrorCache, MediaCache, MediaKey, SharedConfig, ThumbnailDecision,
    ThumbnailPolicy,
};

use crate::fetch::{DirectResolver, OriginResolver, RemoteFetcher, canonicalize};
use crate::preview::{PreviewExtractor, PreviewResult, PreviewSettings};

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub media_evicted: usize,
    pub previews_evicted: usize,
    pub failures_purged: usize,
}

pub struct MediaRepo {
    config: Arc<SharedConfig>,
    errors: Arc<ErrorCache>,
    media: MediaCache<CachedMedia>,
    previews: MediaCache<PreviewResult>,
    fetcher: Arc<RemoteFetcher>,
    previewer: Arc<PreviewExtractor>,
}

impl MediaRepo {
    /// Build a repository that reaches origins over HTTPS.
    pub fn new(config: Arc<SharedConfig>) -> Result<Self, Error> {
        Self::with_resolver(config, Arc::new(DirectResolver::https()))
    }

    /// Build a repository with a custom origin resolver.
    ///
    /// Worker pool sizes and HTTP client settings are fixed here; a reload does not resize them.
    pub fn with_resolver(config: Arc<SharedConfig>, resolver: Arc<dyn OriginResolver>) -> Result<Self, Error> {
        let snapshot = config.snapshot();
        let errors = Arc::new(ErrorCache::new(snapshot.downloads.failure_ttl()));
        let fetcher = RemoteFetcher::new(&snapshot.http, &snapshot.downloads, resolver, Arc::clone(&errors))?;
        let previewer = PreviewExtractor::new(Arc::clone(&config))?;

        Ok(Self {
            config,
            errors,
            media: MediaCache::new("media"),
            previews: MediaCache::new("previews"),
            fetcher: Arc::new(fetcher),
            previewer: Arc::new(previewer),
        })
    }

    /// Serve `origin/media_id` from cache, or download it once for every concurrent caller.
    pub async fn fetch_remote_media(&self, origin: &str, media_id: &str) -> Result<CachedMedia, Error> {
        let config = self.config.snapshot();
        let key = MediaKey::remote(origin, media_id)?;

        if let Some(err) = self.errors.lookup(&key).await {
            tracing::warn!(%key, error = %err, "returning cached download failure");
            return Err(err);
        }

        let policy = CachePolicy::from(&config.downloads.cache);
        let fetcher = Arc::clone(&self.fetcher);
        let max_bytes = config.downloads.max_bytes;
        let (origin, media_id) = (origin.to_string(), media_id.to_string());

        self.media
            .get_or_fetch(&key, &policy, move || async move { fetcher.download(&origin, &media_id, max_bytes).await })
            .await
    }

    /// Serve a preview of `url` from cache, or generate it once for every concurrent caller.
    pub async fn get_or_generate_preview(&self, url: &str) -> Result<PreviewResult, Error> {
        let config = self.config.snapshot();
        if !config.url_previews.enabled {
            return Err(Error::Disabled("URL previews are disabled".to_string()));
        }

        let url = canonicalize(url)?;
        let key = MediaKey::url(url.as_str());

        if let Some(err) = self.errors.lookup(&key).await {
            tracing::warn!(%key, error = %err, "returning cached preview failure");
            return Err(err);
        }

        let settings = PreviewSettings::from_config(&config)?;
        let policy = CachePolicy::from(&config.downloads.cache);
        let previewer = Arc::clone(&self.previewer);
        let errors = Arc::clone(&self.errors);
        let failed_key = key.clone();

        self.previews
            .get_or_fetch(&key, &policy, move || async move {
                let result = previewer.generate_preview(&url, &settings).await;
                if let Err(err) = &result
                    && err.is_cacheable()
                {
                    errors.record_failure(failed_key, err.clone()).await;
                }
                result
            })
            .await
    }

    /// Whether a thumbnail should be generated for `media`, and of which kind.
    pub fn thumbnail_decision(&self, media: &CachedMedia) -> ThumbnailDecision {
        ThumbnailPolicy::from(&self.config.snapshot().thumbnails).decide(&media.content_type, media.size)
    }

    /// Re-read configuration from every source.
    ///
    /// Operations already running finish under the configuration they started with.
    pub async fn reload_config(&self) -> Result<(), ConfigError> {
        let config = self.config.reload()?;
        self.errors.set_ttl(config.downloads.failure_ttl()).await;
        Ok(())
    }

    /// Install an already validated configuration.
    pub async fn apply_config(&self, config: AppConfig) {
        let config = self.config.replace(config);
        self.errors.set_ttl(config.downloads.failure_ttl()).await;
    }

    /// Evict cold cache entries and purge expired failures.
    pub async fn run_maintenance(&self) -> MaintenanceReport {
        let config = self.config.snapshot();
        let policy = CachePolicy::from(&config.downloads.cache);

        let report = MaintenanceReport {
            media_evicted: self.media.eviction_sweep(&policy),
            previews_evicted: self.previews.eviction_sweep(&policy),
            failures_purged: self.errors.purge_expired().await,
        };
        tracing::debug!(
            media_evicted = report.media_evicted,
            previews_evicted = report.previews_evicted,
            failures_purged = report.failures_purged,
            media_bytes = self.media.total_bytes(),
            "maintenance pass complete"
        );
        report
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.snapshot()
    }

    pub fn errors(&self) -> &ErrorCache {
        &self.errors
    }

    pub fn media_cache(&self) -> &MediaCache<CachedMedia> {
        &self.media
    }

    pub fn preview_cache(&self) -> &MediaCache<PreviewResult> {
        &self.previews
    }
}
