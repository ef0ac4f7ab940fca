//! Tool implementations.
//!
//! This module contains every tool exposed by the media-repo server.

pub mod admin;
pub mod download;
pub mod preview;
