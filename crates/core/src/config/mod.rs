//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (MEDIA_REPO_*, `__` separates sections)
//! 2. TOML config file (if MEDIA_REPO_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! Components never read configuration mid-operation. They take a [`SharedConfig::snapshot`]
//! when an operation starts and use it until the operation ends.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (MEDIA_REPO_*)
/// 2. TOML config file (if MEDIA_REPO_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Outbound HTTP client settings shared by every pipeline.
    #[serde(default)]
    pub http: HttpConfig,

    /// Remote media downloads and the positive cache.
    #[serde(default)]
    pub downloads: DownloadsConfig,

    /// Link preview generation.
    #[serde(default)]
    pub url_previews: UrlPreviewsConfig,

    /// Thumbnail eligibility.
    #[serde(default)]
    pub thumbnails: ThumbnailsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadsConfig {
    /// Largest remote media accepted, in bytes. Zero disables the ceiling.
    #[serde(default = "default_download_max_bytes")]
    pub max_bytes: u64,

    /// Concurrent outbound downloads.
    #[serde(default = "default_workers")]
    pub num_workers: usize,

    /// How long a failed download is remembered before the origin is retried.
    #[serde(default = "default_failure_cache_minutes")]
    pub failure_cache_minutes: u64,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Popularity and residency tunables for the positive cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Aggregate ceiling across all entries.
    #[serde(default = "default_cache_max_size_bytes")]
    pub max_size_bytes: u64,

    /// Entries larger than this are served but never stored.
    #[serde(default = "default_cache_max_file_size_bytes")]
    pub max_file_size_bytes: u64,

    /// Length of the window over which accesses are counted.
    #[serde(default = "default_tracked_minutes")]
    pub tracked_minutes: u64,

    /// Entries younger than this are never evicted.
    #[serde(default = "default_min_cache_time_seconds")]
    pub min_cache_time_seconds: u64,

    /// An evicted entry is not re-admitted until this long after eviction.
    #[serde(default = "default_min_evicted_time_seconds")]
    pub min_evicted_time_seconds: u64,

    /// Accesses per window below which a resident entry counts as cold.
    #[serde(default = "default_min_downloads")]
    pub min_downloads: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlPreviewsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Words kept in a preview description.
    #[serde(default = "default_num_words")]
    pub num_words: usize,

    /// Largest page body read, in bytes. Zero disables the ceiling.
    #[serde(default = "default_max_page_size_bytes")]
    pub max_page_size_bytes: u64,

    /// Concurrent outbound page and image fetches.
    #[serde(default = "default_workers")]
    pub num_workers: usize,

    /// CIDR ranges previews may never connect to.
    #[serde(default = "default_disallowed_networks")]
    pub disallowed_networks: Vec<String>,

    /// CIDR ranges previews may connect to. Empty allows everything not disallowed.
    #[serde(default = "default_allowed_networks")]
    pub allowed_networks: Vec<String>,

    /// How the fallback `<img>` candidate is chosen when no `og:image` exists.
    #[serde(default)]
    pub image_selection: ImageSelection,
}

/// Comparator used to pick a representative `<img>` from a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSelection {
    /// Replace the current pick whenever a candidate's area is strictly smaller.
    #[default]
    SmallestArea,
    /// Replace the current pick whenever a candidate's area is strictly larger.
    LargestArea,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailsConfig {
    /// Sources larger than this are never thumbnailed.
    #[serde(default = "default_thumbnail_max_source_bytes")]
    pub max_source_bytes: u64,

    /// Content types eligible for thumbnailing.
    #[serde(default = "default_thumbnail_types")]
    pub types: Vec<String>,

    /// Whether animated sources may produce animated thumbnails.
    #[serde(default = "default_true")]
    pub allow_animated: bool,

    /// Animated sources above this size get a static thumbnail.
    #[serde(default = "default_thumbnail_max_animate_size_bytes")]
    pub max_animate_size_bytes: u64,
}

fn default_user_agent() -> String {
    "media-repo/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_download_max_bytes() -> u64 {
    104_857_600 // 100MB
}

fn default_workers() -> usize {
    10
}

fn default_failure_cache_minutes() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

fn default_cache_max_size_bytes() -> u64 {
    1_048_576_000 // 1GB
}

fn default_cache_max_file_size_bytes() -> u64 {
    104_857_600 // 100MB
}

fn default_tracked_minutes() -> u64 {
    30
}

fn default_min_cache_time_seconds() -> u64 {
    300
}

fn default_min_evicted_time_seconds() -> u64 {
    60
}

fn default_min_downloads() -> u64 {
    5
}

fn default_num_words() -> usize {
    30
}

fn default_max_page_size_bytes() -> u64 {
    10_485_760 // 10MB
}

fn default_disallowed_networks() -> Vec<String> {
    ["127.0.0.1/8", "10.0.0.0/8", "172.16.0.0/12", "192.168.0.0/16", "100.64.0.0/10", "169.254.0.0/16"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_allowed_networks() -> Vec<String> {
    vec!["0.0.0.0/0".into()]
}

fn default_thumbnail_max_source_bytes() -> u64 {
    10_485_760 // 10MB
}

fn default_thumbnail_types() -> Vec<String> {
    ["image/jpeg", "image/jpg", "image/png", "image/gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_thumbnail_max_animate_size_bytes() -> u64 {
    10_485_760 // 10MB
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { user_agent: default_user_agent(), timeout_ms: default_timeout_ms() }
    }
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_download_max_bytes(),
            num_workers: default_workers(),
            failure_cache_minutes: default_failure_cache_minutes(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_bytes: default_cache_max_size_bytes(),
            max_file_size_bytes: default_cache_max_file_size_bytes(),
            tracked_minutes: default_tracked_minutes(),
            min_cache_time_seconds: default_min_cache_time_seconds(),
            min_evicted_time_seconds: default_min_evicted_time_seconds(),
            min_downloads: default_min_downloads(),
        }
    }
}

impl Default for UrlPreviewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_words: default_num_words(),
            max_page_size_bytes: default_max_page_size_bytes(),
            num_workers: default_workers(),
            disallowed_networks: default_disallowed_networks(),
            allowed_networks: default_allowed_networks(),
            image_selection: ImageSelection::default(),
        }
    }
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: default_thumbnail_max_source_bytes(),
            types: default_thumbnail_types(),
            allow_animated: true,
            max_animate_size_bytes: default_thumbnail_max_animate_size_bytes(),
        }
    }
}

impl HttpConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DownloadsConfig {
    /// Failure-cache residency as a Duration.
    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_cache_minutes.saturating_mul(60))
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `MEDIA_REPO_`
    /// 2. TOML file from `MEDIA_REPO_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("MEDIA_REPO_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("MEDIA_REPO_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

/// Handle to the live configuration.
///
/// Readers take an `Arc` snapshot; only [`SharedConfig::replace`] and
/// [`SharedConfig::reload`] swap it.
#[derive(Debug)]
pub struct SharedConfig {
    current: RwLock<Arc<AppConfig>>,
}

impl SharedConfig {
    pub fn new(config: AppConfig) -> Self {
        Self { current: RwLock::new(Arc::new(config)) }
    }

    /// The configuration in force at the time of the call.
    pub fn snapshot(&self) -> Arc<AppConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install an already validated configuration.
    pub fn replace(&self, config: AppConfig) -> Arc<AppConfig> {
        let config = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = Arc::clone(&config),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&config),
        }
        config
    }

    /// Re-read every configuration source and install the result.
    ///
    /// On failure the previous configuration stays in force.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        let config = AppConfig::load()?;
        tracing::info!("configuration reloaded");
        Ok(self.replace(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.http.user_agent, "media-repo/0.1");
        assert_eq!(config.http.timeout_ms, 20_000);
        assert_eq!(config.downloads.max_bytes, 104_857_600);
        assert_eq!(config.downloads.num_workers, 10);
        assert_eq!(config.downloads.failure_cache_minutes, 15);
        assert!(config.downloads.cache.enabled);
        assert_eq!(config.downloads.cache.max_size_bytes, 1_048_576_000);
        assert_eq!(config.downloads.cache.min_downloads, 5);
        assert_eq!(config.url_previews.num_words, 30);
        assert_eq!(config.url_previews.max_page_size_bytes, 10_485_760);
        assert_eq!(config.url_previews.disallowed_networks.len(), 6);
        assert_eq!(config.url_previews.image_selection, ImageSelection::SmallestArea);
        assert_eq!(config.thumbnails.types.len(), 4);
    }

    #[test]
    fn test_durations() {
        let config = AppConfig::default();
        assert_eq!(config.http.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.downloads.failure_ttl(), Duration::from_secs(15 * 60));

        let mut config = AppConfig::default();
        config.downloads.failure_cache_minutes = u64::MAX;
        assert_eq!(config.downloads.failure_ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_load_layers_env_over_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "media-repo.toml",
                r#"
                [downloads]
                max_bytes = 2048

                [url_previews]
                num_words = 12
                image_selection = "largest_area"
                "#,
            )?;
            jail.set_env("MEDIA_REPO_CONFIG_FILE", "media-repo.toml");
            jail.set_env("MEDIA_REPO_URL_PREVIEWS__NUM_WORDS", "7");

            let config = AppConfig::load().expect("config should load");
            assert_eq!(config.downloads.max_bytes, 2048);
            assert_eq!(config.url_previews.num_words, 7);
            assert_eq!(config.url_previews.image_selection, ImageSelection::LargestArea);
            assert_eq!(config.downloads.num_workers, 10);
            Ok(())
        });
    }

    #[test]
    fn test_shared_config_snapshot_survives_replace() {
        let shared = SharedConfig::new(AppConfig::default());
        let before = shared.snapshot();

        let mut updated = AppConfig::default();
        updated.url_previews.num_words = 3;
        shared.replace(updated);

        assert_eq!(before.url_previews.num_words, 30);
        assert_eq!(shared.snapshot().url_previews.num_words, 3);
    }
}
