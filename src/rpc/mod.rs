//! # RPC channel
//!
//! [`RpcChannel`] multiplexes concurrent async callers over one request
//! queue to the engine's worker pool. Every request carries a correlation
//! id and is resolved only by the reply echoing that id.
//!
//! ```rust,ignore
//! use mszsession::rpc::{RpcChannel, RpcConfig};
//! use mszsession::engine::mzml::MzMLEngine;
//! use std::sync::Arc;
//!
//! let channel = RpcChannel::spawn(Arc::new(MzMLEngine::default()), RpcConfig::default())?;
//! let version = channel.codec_version(&CancellationToken::new()).await?;
//! ```

mod channel;
mod config;
mod error;
mod verbs;

#[cfg(test)]
mod tests;

pub use channel::RpcChannel;
pub use config::{RpcConfig, DEFAULT_CALL_TIMEOUT, DEFAULT_CONVERSION_TIMEOUT};
pub use error::RpcError;
