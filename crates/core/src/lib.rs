//! Core types and shared functionality for the media repository.
//!
//! This crate provides:
//! - The failure cache and the popularity-bounded media cache
//! - Unified error types
//! - Configuration structures
//! - Thumbnail eligibility rules

pub mod cache;
pub mod config;
pub mod error;
pub mod thumbnail;

pub use cache::{CachePolicy, CacheValue, CachedMedia, ErrorCache, MediaCache, MediaKey};
pub use config::{AppConfig, ImageSelection, SharedConfig};
pub use error::{Error, FailureKind};
pub use thumbnail::{ThumbnailDecision, ThumbnailPolicy};
