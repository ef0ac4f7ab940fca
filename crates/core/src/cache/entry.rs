//! Cached values.

use bytes::Bytes;

use super::hash::content_digest;
use super::key::MediaKey;

/// Content type assumed when an origin does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A value the media cache can hold.
///
/// The cache only needs to know how many bytes a value accounts for against its
/// ceilings; everything else about the value is opaque to it.
pub trait CacheValue: Clone + Send + Sync + 'static {
    fn size_bytes(&self) -> u64;
}

/// A fetched media item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMedia {
    pub key: MediaKey,
    pub content_type: String,
    pub filename: Option<String>,
    pub size: u64,
    /// Hex-encoded SHA-256 of `content`.
    pub sha256: String,
    pub content: Bytes,
}

impl CachedMedia {
    pub fn new(key: MediaKey, content_type: Option<String>, filename: Option<String>, content: Bytes) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        Self {
            key,
            content_type,
            filename,
            size: content.len() as u64,
            sha256: content_digest(&content),
            content,
        }
    }
}

impl CacheValue for CachedMedia {
    fn size_bytes(&self) -> u64 {
        self.size
    }
}
