//! Clipforge - ffmpeg-based media processing service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod ops;
pub mod pipeline;
pub mod resolve;
pub mod server;
pub mod store;
