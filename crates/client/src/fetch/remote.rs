//! Remote media retrieval from origin servers.
//!
//! A remote item `origin/media_id` is requested from the origin's own media endpoint
//! with `allow_remote=false`, so an origin never proxies a third server on our behalf.
//! Failures that describe the origin are written to the shared [`ErrorCache`] and
//! replayed until they expire.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

use mediarepo_core::config::{DownloadsConfig, HttpConfig};
use mediarepo_core::{CachedMedia, Error, ErrorCache, MediaKey};

use super::{build_http_client, check_declared_length, content_disposition_filename, declared_length, header_str, read_capped};

/// Maps an origin name to the base URL its media endpoint lives under.
#[async_trait]
pub trait OriginResolver: Send + Sync {
    async fn base_url(&self, origin: &str) -> Result<Url, Error>;
}

/// Treats the origin name as a host, optionally with a port.
#[derive(Debug, Clone)]
pub struct DirectResolver {
    scheme: &'static str,
}

impl DirectResolver {
    pub fn https() -> Self {
        Self { scheme: "https" }
    }

    /// Plain HTTP, for origins on a trusted network.
    pub fn http() -> Self {
        Self { scheme: "http" }
    }
}

impl Default for DirectResolver {
    fn default() -> Self {
        Self::https()
    }
}

#[async_trait]
impl OriginResolver for DirectResolver {
    async fn base_url(&self, origin: &str) -> Result<Url, Error> {
        let url = Url::parse(&format!("{}://{origin}/", self.scheme))
            .map_err(|e| Error::InvalidInput(format!("invalid origin {origin:?}: {e}")))?;
        if url.host_str().is_none() || url.path() != "/" {
            return Err(Error::InvalidInput(format!("invalid origin {origin:?}")));
        }
        Ok(url)
    }
}

/// An origin response whose headers passed validation and whose body is unread.
///
/// Holds a download worker slot until the body is consumed or dropped.
#[derive(Debug)]
pub struct RemoteMedia {
    pub key: MediaKey,
    pub content_type: Option<String>,
    pub filename: Option<String>,
    pub content_length: u64,
    response: Response,
    permit: OwnedSemaphorePermit,
}

impl RemoteMedia {
    /// The body as a stream of chunks. The worker slot is released when the stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> + Send {
        let permit = self.permit;
        self.response.bytes_stream().map(move |chunk| {
            let _slot = &permit;
            chunk.map_err(|e| Error::Upstream(format!("failed to read response: {e}")))
        })
    }

    /// Read the whole body, failing once it grows past `max_bytes`.
    pub async fn read_body(self, max_bytes: u64) -> Result<Bytes, Error> {
        let _slot = self.permit;
        read_capped(self.response, max_bytes).await
    }
}

/// Downloads remote media from origin servers.
///
/// Holds no per-item state; the failure cache is shared with the rest of the repository.
pub struct RemoteFetcher {
    http: Client,
    resolver: Arc<dyn OriginResolver>,
    errors: Arc<ErrorCache>,
    workers: Arc<Semaphore>,
}

impl RemoteFetcher {
    pub fn new(
        http: &HttpConfig, downloads: &DownloadsConfig, resolver: Arc<dyn OriginResolver>, errors: Arc<ErrorCache>,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: build_http_client(http)?,
            resolver,
            errors,
            workers: Arc::new(Semaphore::new(downloads.num_workers.max(1))),
        })
    }

    /// Request `origin/media_id` and validate the response headers.
    ///
    /// A live failure record for the key is returned without contacting the origin.
    pub async fn fetch(&self, origin: &str, media_id: &str, max_bytes: u64) -> Result<RemoteMedia, Error> {
        let key = MediaKey::remote(origin, media_id)?;

        if let Some(err) = self.errors.lookup(&key).await {
            tracing::warn!(%key, error = %err, "returning cached download failure");
            return Err(err);
        }

        let result = self.request(&key, max_bytes).await;
        if let Err(err) = &result {
            self.remember(&key, err).await;
        }
        result
    }

    /// Fetch and read the full body of `origin/media_id`.
    pub async fn download(&self, origin: &str, media_id: &str, max_bytes: u64) -> Result<CachedMedia, Error> {
        let media = self.fetch(origin, media_id, max_bytes).await?;
        let key = media.key.clone();
        let content_type = media.content_type.clone();
        let filename = media.filename.clone();

        match media.read_body(max_bytes).await {
            Ok(content) => {
                tracing::info!(%key, size = content.len(), "downloaded remote media");
                Ok(CachedMedia::new(key, content_type, filename, content))
            }
            Err(err) => {
                self.remember(&key, &err).await;
                Err(err)
            }
        }
    }

    async fn remember(&self, key: &MediaKey, err: &Error) {
        if err.is_cacheable() {
            self.errors.record_failure(key.clone(), err.clone()).await;
        } else {
            tracing::debug!(%key, error = %err, "not recording failure");
        }
    }

    async fn request(&self, key: &MediaKey, max_bytes: u64) -> Result<RemoteMedia, Error> {
        let url = self.download_url(key).await?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| Error::Upstream("download workers shut down".to_string()))?;

        tracing::info!(%key, %url, "downloading remote media");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request to origin failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            tracing::info!(%key, "remote media not found");
            return Err(Error::NotFound(format!("{key} not found on origin")));
        }
        if !status.is_success() {
            tracing::warn!(%key, status = status.as_u16(), "origin returned an error");
            return Err(Error::Upstream(format!("origin returned status {}", status.as_u16())));
        }

        let headers = response.headers();
        let content_length = declared_length(headers)?
            .ok_or_else(|| Error::Malformed(format!("{key}: origin did not declare a content length")))?;
        check_declared_length(content_length, max_bytes)?;

        let content_type = header_str(headers, CONTENT_TYPE);
        let filename = header_str(headers, CONTENT_DISPOSITION).and_then(|v| content_disposition_filename(&v));

        Ok(RemoteMedia { key: key.clone(), content_type, filename, content_length, response, permit })
    }

    async fn download_url(&self, key: &MediaKey) -> Result<Url, Error> {
        let MediaKey::Remote { origin, media_id } = key else {
            return Err(Error::InvalidInput(format!("{key} is not a remote media key")));
        };

        let mut url = self.resolver.base_url(origin).await?;
        url.path_segments_mut()
            .map_err(|_| Error::InvalidInput(format!("origin {origin:?} cannot carry a path")))?
            .clear()
            .extend(["_matrix", "media", "v3", "download", origin.as_str(), media_id.as_str()]);
        url.query_pairs_mut().clear().append_pair("allow_remote", "false");
        Ok(url)
    }
}
