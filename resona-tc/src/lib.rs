//! resona-tc: server-side transcoding and streaming-artifact service
//!
//! Converts source audio files into a multi-quality segmented ladder
//! (HLS, optionally DASH), serves the resulting artifacts over HTTP, and
//! sweeps expired artifacts on a retention schedule.

pub mod api;
pub mod cleanup;
pub mod config;
pub mod dash;
pub mod encoder;
pub mod error;
pub mod pipeline;

pub use error::{Error, Result};
