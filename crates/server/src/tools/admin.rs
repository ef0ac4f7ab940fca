//! reload and maintenance tool implementations.

use serde::Serialize;

use mediarepo_client::{MaintenanceReport, MediaRepo};

use crate::error::ServerError;

/// Output from the reload tool.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadOutput {
    pub reloaded: bool,
    /// Failure records written from now on live for twice this long.
    pub failure_cache_minutes: u64,
    pub url_previews_enabled: bool,
}

/// Re-read configuration. The previous configuration stays in force on error.
pub async fn reload_impl(repo: &MediaRepo) -> Result<ReloadOutput, ServerError> {
    repo.reload_config().await?;
    let config = repo.config();
    Ok(ReloadOutput {
        reloaded: true,
        failure_cache_minutes: config.downloads.failure_cache_minutes,
        url_previews_enabled: config.url_previews.enabled,
    })
}

pub async fn maintenance_impl(repo: &MediaRepo) -> MaintenanceReport {
    repo.run_maintenance().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mediarepo_core::{AppConfig, SharedConfig};

    #[tokio::test]
    async fn test_maintenance_on_empty_repo() {
        let repo = MediaRepo::new(Arc::new(SharedConfig::new(AppConfig::default()))).unwrap();
        assert_eq!(maintenance_impl(&repo).await, MaintenanceReport::default());
    }
}
