//! Thumbnail eligibility.
//!
//! Generating thumbnails is someone else's job; this module only decides whether
//! a fetched item should get one and whether it may stay animated.

use mime::Mime;
use serde::Serialize;

use crate::config::ThumbnailsConfig;

/// Outcome of [`ThumbnailPolicy::decide`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailDecision {
    /// Content type is not on the thumbnail list.
    UnsupportedType,
    /// Source exceeds `max_source_bytes`.
    TooLarge,
    /// Generate a still thumbnail.
    Static,
    /// Generate an animated thumbnail.
    Animated,
}

impl ThumbnailDecision {
    pub fn should_generate(self) -> bool {
        matches!(self, ThumbnailDecision::Static | ThumbnailDecision::Animated)
    }
}

/// Thumbnail rules captured from a configuration snapshot.
#[derive(Debug, Clone)]
pub struct ThumbnailPolicy {
    max_source_bytes: u64,
    types: Vec<String>,
    allow_animated: bool,
    max_animate_size_bytes: u64,
}

impl From<&ThumbnailsConfig> for ThumbnailPolicy {
    fn from(config: &ThumbnailsConfig) -> Self {
        Self {
            max_source_bytes: config.max_source_bytes,
            types: config.types.iter().map(|t| t.trim().to_ascii_lowercase()).collect(),
            allow_animated: config.allow_animated,
            max_animate_size_bytes: config.max_animate_size_bytes,
        }
    }
}

impl ThumbnailPolicy {
    /// Decide what to do with `size` bytes of `content_type`.
    ///
    /// Content types are compared by essence, so parameters such as `charset`
    /// are ignored. An unparsable content type is never thumbnailed.
    pub fn decide(&self, content_type: &str, size: u64) -> ThumbnailDecision {
        let Ok(parsed) = content_type.parse::<Mime>() else {
            tracing::debug!(content_type, "unparsable content type, skipping thumbnail");
            return ThumbnailDecision::UnsupportedType;
        };
        let essence = parsed.essence_str().to_ascii_lowercase();

        if !self.types.iter().any(|t| t.eq_ignore_ascii_case(&essence)) {
            return ThumbnailDecision::UnsupportedType;
        }
        if self.max_source_bytes > 0 && size > self.max_source_bytes {
            return ThumbnailDecision::TooLarge;
        }

        let animated = parsed.type_() == mime::IMAGE && parsed.subtype() == mime::GIF;
        if animated && self.allow_animated && (self.max_animate_size_bytes == 0 || size <= self.max_animate_size_bytes)
        {
            ThumbnailDecision::Animated
        } else {
            ThumbnailDecision::Static
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ThumbnailPolicy {
        ThumbnailPolicy::from(&ThumbnailsConfig::default())
    }

    #[test]
    fn test_supported_static_image() {
        assert_eq!(policy().decide("image/png", 1024), ThumbnailDecision::Static);
        assert_eq!(policy().decide("IMAGE/JPEG; charset=binary", 1024), ThumbnailDecision::Static);
    }

    #[test]
    fn test_unsupported_types() {
        assert_eq!(policy().decide("video/mp4", 1024), ThumbnailDecision::UnsupportedType);
        assert_eq!(policy().decide("not a mime", 1024), ThumbnailDecision::UnsupportedType);
        assert!(!policy().decide("text/html", 10).should_generate());
    }

    #[test]
    fn test_source_too_large() {
        assert_eq!(policy().decide("image/png", 10_485_761), ThumbnailDecision::TooLarge);
    }

    #[test]
    fn test_gif_animation_rules() {
        let mut config = ThumbnailsConfig { max_source_bytes: 0, max_animate_size_bytes: 100, ..Default::default() };
        let animated = ThumbnailPolicy::from(&config);
        assert_eq!(animated.decide("image/gif", 100), ThumbnailDecision::Animated);
        assert_eq!(animated.decide("image/gif", 101), ThumbnailDecision::Static);

        config.allow_animated = false;
        let still = ThumbnailPolicy::from(&config);
        assert_eq!(still.decide("image/gif", 10), ThumbnailDecision::Static);
    }
}
