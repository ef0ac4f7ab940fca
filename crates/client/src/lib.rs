//! Network side of the media repository.
//!
//! This crate provides the remote download pipeline, link preview generation and
//! the [`MediaRepo`] facade that puts them behind the caches from `mediarepo-core`.

pub mod fetch;
pub mod preview;
pub mod repo;

pub use fetch::{DirectResolver, NetworkPolicy, OriginResolver, RemoteFetcher, RemoteMedia, canonicalize};
pub use preview::{PageMetadata, PreviewExtractor, PreviewResult, PreviewSettings, summarize};
pub use repo::{MaintenanceReport, MediaRepo};
