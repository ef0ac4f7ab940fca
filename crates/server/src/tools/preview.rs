//! preview tool implementation.
//!
//! Produces a link preview for a URL, served from cache when possible.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use mediarepo_client::{MediaRepo, PreviewResult};
use mediarepo_core::{CachedMedia, Error};

/// Input parameters for the preview tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PreviewParams {
    /// The page to preview.
    pub url: String,
}

/// Output structure for the preview tool.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewOutput {
    /// The page URL, or its `og:url` when the page declares one.
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub og_type: Option<String>,
    pub image: Option<PreviewImage>,
    /// ISO8601 timestamp of when the preview was served.
    pub served_at: String,
}

/// The preview image, without its bytes.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewImage {
    pub url: String,
    pub content_type: String,
    pub filename: Option<String>,
    pub size: u64,
    pub sha256: String,
}

impl From<CachedMedia> for PreviewImage {
    fn from(image: CachedMedia) -> Self {
        Self {
            url: image.key.to_string(),
            content_type: image.content_type,
            filename: image.filename,
            size: image.size,
            sha256: image.sha256,
        }
    }
}

impl From<PreviewResult> for PreviewOutput {
    fn from(preview: PreviewResult) -> Self {
        Self {
            url: preview.url,
            title: preview.title,
            description: preview.description,
            site_name: preview.site_name,
            og_type: preview.og_type,
            image: preview.image.map(PreviewImage::from),
            served_at: Utc::now().to_rfc3339(),
        }
    }
}

pub async fn preview_impl(repo: &MediaRepo, params: PreviewParams) -> Result<PreviewOutput, Error> {
    Ok(repo.get_or_generate_preview(&params.url).await?.into())
}
