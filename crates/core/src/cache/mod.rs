//! In-memory retrieval caches.
//!
//! Two caches sit in front of every origin fetch:
//!
//! - [`ErrorCache`] remembers failed fetches per key so a broken origin is not
//!   retried until the failure expires.
//! - [`MediaCache`] holds successful results, bounded by an aggregate byte
//!   ceiling and evicting entries that are both old enough and unpopular.
//!   Concurrent misses for one key share a single fetch.

pub mod entry;
pub mod error_cache;
pub mod hash;
pub mod key;
pub mod media_cache;
pub mod policy;

pub use crate::Error;

pub use entry::{CacheValue, CachedMedia};
pub use error_cache::{DownloadFailure, ErrorCache};
pub use key::MediaKey;
pub use media_cache::{EntryStats, MediaCache};
pub use policy::CachePolicy;
