//! download tool implementation.
//!
//! Fetches remote media through the caches and reports what was served.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use mediarepo_client::MediaRepo;
use mediarepo_core::{Error, ThumbnailDecision};

/// Input parameters for the download tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DownloadParams {
    /// Server name the media belongs to.
    pub origin: String,
    /// Identifier of the media on that server.
    pub media_id: String,
}

/// Output structure for the download tool.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutput {
    pub origin: String,
    pub media_id: String,
    pub content_type: String,
    pub filename: Option<String>,
    pub size: u64,
    /// Hex SHA-256 of the content.
    pub sha256: String,
    /// Whether and how a thumbnail should be generated.
    pub thumbnail: ThumbnailDecision,
    /// ISO8601 timestamp of when the media was served.
    pub served_at: String,
}

pub async fn download_impl(repo: &MediaRepo, params: DownloadParams) -> Result<DownloadOutput, Error> {
    let media = repo.fetch_remote_media(&params.origin, &params.media_id).await?;
    let thumbnail = repo.thumbnail_decision(&media);

    Ok(DownloadOutput {
        origin: params.origin,
        media_id: params.media_id,
        content_type: media.content_type,
        filename: media.filename,
        size: media.size,
        sha256: media.sha256,
        thumbnail,
        served_at: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use mediarepo_client::DirectResolver;
    use mediarepo_core::{AppConfig, SharedConfig};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_impl() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/_matrix/media/v3/download/{}/cat", server.address())))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"\xff\xd8\xff".to_vec(), "image/jpeg")
                    .insert_header("content-disposition", "attachment; filename=cat.jpg"),
            )
            .mount(&server)
            .await;

        let config = Arc::new(SharedConfig::new(AppConfig::default()));
        let repo = MediaRepo::with_resolver(config, Arc::new(DirectResolver::http())).unwrap();
        let params = DownloadParams { origin: server.address().to_string(), media_id: "cat".into() };

        let output = download_impl(&repo, params).await.unwrap();
        assert_eq!(output.content_type, "image/jpeg");
        assert_eq!(output.filename.as_deref(), Some("cat.jpg"));
        assert_eq!(output.size, 3);
        assert_eq!(output.thumbnail, ThumbnailDecision::Static);
        assert!(chrono::DateTime::parse_from_rfc3339(&output.served_at).is_ok());
    }

    #[tokio::test]
    async fn test_download_impl_invalid_id() {
        let repo = MediaRepo::new(Arc::new(SharedConfig::new(AppConfig::default()))).unwrap();
        let params = DownloadParams { origin: "example.org".into(), media_id: " ".into() };

        let result = download_impl(&repo, params).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
