//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use ipnet::IpNet;
use thiserror::Error;

/// Upper bound for minute-valued settings: one year.
pub const MAX_MINUTES: u64 = 365 * 24 * 60;

/// Upper bound for second-valued settings: one year.
pub const MAX_SECONDS: u64 = MAX_MINUTES * 60;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `http.user_agent` is empty
    /// - `http.timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - a worker count or `url_previews.num_words` is 0
    /// - `downloads.cache.tracked_minutes` is 0
    /// - a minute or second residency setting exceeds one year
    /// - a network list entry is not valid CIDR notation
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "http.user_agent".into(), reason: "must not be empty".into() });
        }

        if self.http.timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "http.timeout_ms".into(),
                reason: "must be at least 100ms".into(),
            });
        }
        if self.http.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "http.timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.downloads.num_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "downloads.num_workers".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.url_previews.num_workers == 0 {
            return Err(ConfigError::Invalid {
                field: "url_previews.num_workers".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.url_previews.num_words == 0 {
            return Err(ConfigError::Invalid {
                field: "url_previews.num_words".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.downloads.cache.tracked_minutes == 0 {
            return Err(ConfigError::Invalid {
                field: "downloads.cache.tracked_minutes".into(),
                reason: "must be greater than 0".into(),
            });
        }

        for (field, minutes) in [
            ("downloads.failure_cache_minutes", self.downloads.failure_cache_minutes),
            ("downloads.cache.tracked_minutes", self.downloads.cache.tracked_minutes),
        ] {
            if minutes > MAX_MINUTES {
                return Err(ConfigError::Invalid {
                    field: field.into(),
                    reason: format!("must not exceed one year ({MAX_MINUTES} minutes)"),
                });
            }
        }
        for (field, seconds) in [
            ("downloads.cache.min_cache_time_seconds", self.downloads.cache.min_cache_time_seconds),
            ("downloads.cache.min_evicted_time_seconds", self.downloads.cache.min_evicted_time_seconds),
        ] {
            if seconds > MAX_SECONDS {
                return Err(ConfigError::Invalid {
                    field: field.into(),
                    reason: format!("must not exceed one year ({MAX_SECONDS} seconds)"),
                });
            }
        }

        for (field, networks) in [
            ("url_previews.disallowed_networks", &self.url_previews.disallowed_networks),
            ("url_previews.allowed_networks", &self.url_previews.allowed_networks),
        ] {
            if let Some(bad) = networks.iter().find(|n| n.parse::<IpNet>().is_err()) {
                return Err(ConfigError::Invalid { field: field.into(), reason: format!("{bad} is not a CIDR range") });
            }
        }

        let cache = &self.downloads.cache;
        if cache.enabled && cache.max_file_size_bytes > cache.max_size_bytes {
            tracing::warn!(
                max_file_size_bytes = cache.max_file_size_bytes,
                max_size_bytes = cache.max_size_bytes,
                "downloads.cache.max_file_size_bytes exceeds the aggregate ceiling; \
                 entries between the two are never cached"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_user_agent() {
        let mut config = AppConfig::default();
        config.http.user_agent = String::new();
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "http.user_agent"));
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let mut config = AppConfig::default();
        config.http.timeout_ms = 50;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "http.timeout_ms"));

        config.http.timeout_ms = 301_000;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "http.timeout_ms"));

        config.http.timeout_ms = 300_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = AppConfig::default();
        config.downloads.num_workers = 0;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "downloads.num_workers"));

        let mut config = AppConfig::default();
        config.url_previews.num_workers = 0;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "url_previews.num_workers"));
    }

    #[test]
    fn test_validate_zero_words() {
        let mut config = AppConfig::default();
        config.url_previews.num_words = 0;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "url_previews.num_words"));
    }

    #[test]
    fn test_validate_residency_upper_bounds() {
        let mut config = AppConfig::default();
        config.downloads.failure_cache_minutes = u64::MAX;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "downloads.failure_cache_minutes"));

        let mut config = AppConfig::default();
        config.downloads.cache.tracked_minutes = MAX_MINUTES + 1;
        let result = config.validate();
        assert!(matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "downloads.cache.tracked_minutes"));

        let mut config = AppConfig::default();
        config.downloads.cache.min_evicted_time_seconds = MAX_SECONDS + 1;
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "downloads.cache.min_evicted_time_seconds")
        );

        let mut config = AppConfig::default();
        config.downloads.failure_cache_minutes = MAX_MINUTES;
        config.downloads.cache.min_cache_time_seconds = MAX_SECONDS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_cidr() {
        let mut config = AppConfig::default();
        config.url_previews.disallowed_networks.push("10.0.0.0/99".into());
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::Invalid { field, .. }) if field == "url_previews.disallowed_networks")
        );
    }

    #[test]
    fn test_validate_zero_ceilings_allowed() {
        let mut config = AppConfig::default();
        config.downloads.max_bytes = 0;
        config.url_previews.max_page_size_bytes = 0;
        assert!(config.validate().is_ok());
    }
}
