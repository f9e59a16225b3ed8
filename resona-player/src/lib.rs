//! # Resona Player Library
//!
//! Client-side playback core:
//! - Playback engine owning the single live audio resource, with
//!   snapshot subscriptions and position/volume persistence
//! - Adaptive streaming controller for segmented-manifest sources
//! - Offline download manager backed by a content-addressable cache store
//! - SQLite persistence for settings and download records
//!
//! UI surfaces hold a [`PlaybackEngine`] and a [`download::DownloadManager`]
//! by reference and consume read-only snapshots and events; nothing here
//! is ambient global state.

pub mod abr;
pub mod backend;
pub mod cache;
pub mod db;
pub mod download;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod state;

pub use engine::PlaybackEngine;
pub use error::{Error, Result};
