//! # Compression configuration
//!
//! [`CompressionConfig`] travels with every prepare/compress/decompress
//! request. [`CompressionMode`] presets fill in the target formats and zstd
//! level the way the desktop tool's mode selector does.

mod config;
mod error;
mod mode;

pub use config::CompressionConfig;
pub use error::ConfigError;
pub use mode::CompressionMode;
