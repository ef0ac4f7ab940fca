//! Cache keys.

use std::fmt;

use crate::Error;

/// Identity of a cacheable item.
///
/// Remote media is keyed by the origin server plus the opaque media id the origin
/// assigned; previews are keyed by their normalized absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaKey {
    Remote { origin: String, media_id: String },
    Url(String),
}

impl MediaKey {
    /// Build a remote media key, rejecting values that cannot name a download.
    ///
    /// Origins are compared case-insensitively, so the host part is lowercased.
    pub fn remote(origin: &str, media_id: &str) -> Result<Self, Error> {
        let origin = origin.trim();
        let media_id = media_id.trim();

        if origin.is_empty() {
            return Err(Error::InvalidInput("origin cannot be empty".into()));
        }
        if origin.contains('/') || origin.chars().any(char::is_whitespace) {
            return Err(Error::InvalidInput(format!("invalid origin: {origin}")));
        }
        if media_id.is_empty() {
            return Err(Error::InvalidInput("media id cannot be empty".into()));
        }
        if media_id.contains('/') {
            return Err(Error::InvalidInput(format!("invalid media id: {media_id}")));
        }

        Ok(MediaKey::Remote { origin: origin.to_lowercase(), media_id: media_id.to_string() })
    }

    /// Build a preview key from an already normalized URL.
    pub fn url(normalized: impl Into<String>) -> Self {
        MediaKey::Url(normalized.into())
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKey::Remote { origin, media_id } => write!(f, "{origin}/{media_id}"),
            MediaKey::Url(url) => f.write_str(url),
        }
    }
}
