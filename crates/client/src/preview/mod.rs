//! Link preview generation.
//!
//! ### Page Metadata
//! - OpenGraph properties are used first.
//! - Missing fields fall back to the page itself: `<title>` or headings, the meta
//!   description or visible body text, and a representative `<img>`.
//! - Descriptions are cut to the configured number of words.
//!
//! ### Failure Semantics
//! - The page is the only thing a preview cannot do without. Any page failure other
//!   than an oversize body becomes `NotFound`.
//! - The image is optional. Any image failure is logged and the preview is returned
//!   without one.
//! - Both the page and the image destination are checked against the network policy,
//!   and so is every redirect hop on the way to them. A page that is blocked, directly
//!   or through a redirect, fails with `Forbidden`.

pub mod fallback;
pub mod opengraph;
pub mod summarize;

pub use opengraph::OpenGraph;
pub use summarize::summarize;

use std::sync::Arc;

use reqwest::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE, LOCATION};
use reqwest::{Client, Response};
use scraper::Html;
use tokio::sync::Semaphore;
use url::Url;

use mediarepo_core::{AppConfig, CacheValue, CachedMedia, Error, ImageSelection, MediaKey, SharedConfig};

use crate::fetch::{
    MAX_REDIRECTS, NetworkPolicy, PolicyResolver, build_guarded_client, check_declared_length,
    content_disposition_filename, declared_length, header_str, read_capped,
};

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";

/// A generated link preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewResult {
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub og_type: Option<String>,
    pub image: Option<CachedMedia>,
}

impl CacheValue for PreviewResult {
    fn size_bytes(&self) -> u64 {
        let text = [&self.title, &self.description, &self.site_name, &self.og_type]
            .into_iter()
            .flatten()
            .map(|s| s.len() as u64)
            .sum::<u64>();
        self.url.len() as u64 + text + self.image.as_ref().map_or(0, |i| i.size)
    }
}

/// Per-operation preview settings taken from a configuration snapshot.
#[derive(Debug, Clone)]
pub struct PreviewSettings {
    pub max_words: usize,
    pub max_page_bytes: u64,
    /// Preview images are bounded like any other download.
    pub max_image_bytes: u64,
    pub image_selection: ImageSelection,
    pub network: NetworkPolicy,
}

impl PreviewSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let previews = &config.url_previews;
        Ok(Self {
            max_words: previews.num_words,
            max_page_bytes: previews.max_page_size_bytes,
            max_image_bytes: config.downloads.max_bytes,
            image_selection: previews.image_selection,
            network: NetworkPolicy::from_config(previews)?,
        })
    }
}

/// Metadata pulled from a page before any image is fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_name: Option<String>,
    pub og_type: Option<String>,
    pub image: Option<String>,
}

impl PageMetadata {
    /// Parse `html` and merge OpenGraph with the page fallbacks.
    pub fn extract(html: &str, selection: ImageSelection) -> Self {
        let document = Html::parse_document(html);
        let og = OpenGraph::from_document(&document);

        Self {
            url: og.url,
            title: og.title.or_else(|| fallback::title(&document)),
            description: og.description.or_else(|| fallback::description(&document)),
            site_name: og.site_name,
            og_type: og.og_type,
            image: og.image.or_else(|| fallback::image(&document, selection)),
        }
    }
}

/// Fetches pages and their images to build previews.
pub struct PreviewExtractor {
    http: Client,
    workers: Arc<Semaphore>,
}

impl PreviewExtractor {
    /// Build an extractor whose connections obey the network policy of `config`.
    ///
    /// The client and the worker count come from the snapshot at construction.
    pub fn new(config: Arc<SharedConfig>) -> Result<Self, Error> {
        let snapshot = config.snapshot();
        let resolver = Arc::new(PolicyResolver::new(config));
        Ok(Self {
            http: build_guarded_client(&snapshot.http, resolver)?,
            workers: Arc::new(Semaphore::new(snapshot.url_previews.num_workers.max(1))),
        })
    }

    /// Build a preview of `url`.
    pub async fn generate_preview(&self, url: &Url, settings: &PreviewSettings) -> Result<PreviewResult, Error> {
        let html = match self.fetch_page(url, settings).await {
            Ok(html) => html,
            Err(err @ (Error::TooLarge(_) | Error::Forbidden(_))) => return Err(err),
            Err(err) => {
                tracing::error!(%url, error = %err, "error downloading page");
                return Err(Error::NotFound(format!("no preview available for {url}")));
            }
        };

        let page = PageMetadata::extract(&html, settings.image_selection);
        let mut preview = PreviewResult {
            url: page.url.filter(|u| Url::parse(u).is_ok()).unwrap_or_else(|| url.to_string()),
            title: page.title,
            description: page
                .description
                .map(|d| summarize(&d, settings.max_words))
                .filter(|d| !d.is_empty()),
            site_name: page.site_name,
            og_type: page.og_type,
            image: None,
        };

        if let Some(candidate) = page.image {
            match self.fetch_image(url, &candidate, settings).await {
                Ok(image) => preview.image = Some(image),
                Err(err) => tracing::warn!(%url, image = %candidate, error = %err, "non-fatal error getting preview image"),
            }
        }

        tracing::info!(%url, has_image = preview.image.is_some(), "generated preview");
        Ok(preview)
    }

    /// GET `url`, following redirects one hop at a time. Each hop passes the
    /// network policy before it is requested.
    async fn get_checked(&self, url: &Url, accept: Option<&str>, network: &NetworkPolicy) -> Result<Response, Error> {
        let mut current = url.clone();
        for _ in 0..=MAX_REDIRECTS {
            network.check_url(&current).await?;

            let mut request = self.http.get(current.clone());
            if let Some(accept) = accept {
                request = request.header(ACCEPT, accept);
            }
            let response = request
                .send()
                .await
                .map_err(|e| Error::Upstream(format!("request to {current} failed: {e}")))?;

            if !response.status().is_redirection() {
                return Ok(response);
            }
            let Some(location) = header_str(response.headers(), LOCATION) else {
                return Ok(response);
            };
            current = current
                .join(&location)
                .map_err(|e| Error::Upstream(format!("invalid redirect target {location:?}: {e}")))?;
            tracing::debug!(from = %url, to = %current, "following redirect");
        }
        Err(Error::Upstream(format!("too many redirects from {url}")))
    }

    async fn fetch_page(&self, url: &Url, settings: &PreviewSettings) -> Result<String, Error> {
        let max_bytes = settings.max_page_bytes;
        let _slot = self.acquire().await?;

        let response = self.get_checked(url, Some(PAGE_ACCEPT), &settings.network).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("page returned status {}", status.as_u16())));
        }
        if let Some(declared) = declared_length(response.headers())? {
            check_declared_length(declared, max_bytes)?;
        }

        let body = read_capped(response, max_bytes).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn fetch_image(&self, page: &Url, candidate: &str, settings: &PreviewSettings) -> Result<CachedMedia, Error> {
        let url = page
            .join(candidate)
            .map_err(|e| Error::Malformed(format!("invalid image URL {candidate:?}: {e}")))?;

        let _slot = self.acquire().await?;
        let response = self.get_checked(&url, None, &settings.network).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("image returned status {}", status.as_u16())));
        }

        let headers = response.headers();
        if let Some(declared) = declared_length(headers)? {
            check_declared_length(declared, settings.max_image_bytes)?;
        }
        let content_type = header_str(headers, CONTENT_TYPE);
        let filename = header_str(headers, CONTENT_DISPOSITION).and_then(|v| content_disposition_filename(&v));

        let content = read_capped(response, settings.max_image_bytes).await?;
        Ok(CachedMedia::new(MediaKey::url(url.as_str()), content_type, filename, content))
    }

    async fn acquire(&self) -> Result<tokio::sync::SemaphorePermit<'_>, Error> {
        self.workers
            .acquire()
            .await
            .map_err(|_| Error::Upstream("preview workers shut down".to_string()))
    }
}
