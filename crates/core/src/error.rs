//! Unified error types for the media repository.
//!
//! Every pipeline failure is one of these variants. Errors are `Clone` because a
//! single origin fetch hands the same outcome to every request waiting on it.

use serde::{Deserialize, Serialize};

/// Coarse classification recorded by the failure cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The origin reported the item does not exist.
    NotFound,
    /// The declared or consumed size exceeds the configured ceiling.
    TooLarge,
    /// Any other non-success status or transport failure.
    UpstreamError,
    /// A header the operation depends on could not be parsed.
    Malformed,
}

/// Unified error type for the retrieval engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Origin reported not-found, or a preview page could not be produced.
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    /// Content exceeds a configured size ceiling.
    #[error("TOO_LARGE: {0}")]
    TooLarge(String),

    /// Non-success status or transport failure talking to an origin.
    #[error("UPSTREAM_ERROR: {0}")]
    Upstream(String),

    /// Unparsable upstream header that the operation cannot do without.
    #[error("MALFORMED: {0}")]
    Malformed(String),

    /// Caller supplied an unusable origin, media id or URL.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Destination rejected by the network allow/deny lists.
    #[error("FORBIDDEN: {0}")]
    Forbidden(String),

    /// The requested feature is switched off in configuration.
    #[error("DISABLED: {0}")]
    Disabled(String),
}

impl Error {
    /// Failure classification, if this error describes the origin.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Error::NotFound(_) => Some(FailureKind::NotFound),
            Error::TooLarge(_) => Some(FailureKind::TooLarge),
            Error::Upstream(_) => Some(FailureKind::UpstreamError),
            Error::Malformed(_) => Some(FailureKind::Malformed),
            Error::InvalidInput(_) | Error::Forbidden(_) | Error::Disabled(_) => None,
        }
    }

    /// Whether this error should suppress retries through the failure cache.
    ///
    /// `Malformed` is returned to the caller but not remembered, matching how a missing
    /// content length is treated on remote downloads.
    pub fn is_cacheable(&self) -> bool {
        matches!(
            self.kind(),
            Some(FailureKind::NotFound | FailureKind::TooLarge | FailureKind::UpstreamError)
        )
    }
}
