//! # mszsession - File Sessions over an Engine RPC Boundary
//!
//! `mszsession` manages open mass spectrometry files (mzML sources, msz
//! archives, vendor files awaiting conversion) on behalf of an interactive
//! front end. The front end never parses a file itself: every operation is a
//! request to an execution engine, sent over an asynchronous RPC channel and
//! matched to its reply by correlation id.
//!
//! ## Key Features
//!
//! - **Correlated RPC**: any number of concurrent callers share one channel;
//!   replies resolve exactly the request they answer, even when two calls
//!   with the same operation are outstanding.
//!
//! - **Memoized sessions**: metadata and the position index are computed at
//!   most once per open file; concurrent first requests share a single
//!   engine call.
//!
//! - **Explicit lifecycle**: sessions move through created, opening, opened
//!   and closed. Closing cancels in-flight work and releases the engine
//!   descriptor exactly once.
//!
//! - **Child-process jobs**: analysis and conversion programs run as child
//!   processes with separate result, diagnostics and progress streams.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use mszsession::engine::mzml::MzMLEngine;
//! use mszsession::prelude::*;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let channel = RpcChannel::spawn(Arc::new(MzMLEngine::default()), RpcConfig::default())?;
//! let registry = SessionRegistry::new(channel);
//!
//! let session = registry.open("run01.mzML").await?;
//! let metadata = session.metadata().await?;
//! println!("{} spectra", metadata.source_total_spec);
//!
//! let spectrum = session.spectrum(0).await?;
//! println!("{} peaks, TIC {}", spectrum.peak_count(), spectrum.total_ion_current());
//!
//! let output = session.output_path(Path::new("out"))?;
//! session
//!     .convert(&output, &CompressionConfig::with_mode(CompressionMode::Better, 4))
//!     .await?;
//! println!("wrote {}", output.display());
//! registry.close_all().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`engine`]: request/response types of the engine boundary, plus the
//!   in-process [`engine::mzml::MzMLEngine`]
//! - [`rpc`]: the correlated request channel and its worker pool
//! - [`session`]: per-file sessions, the single-flight cache and the registry
//! - [`conversion`]: compression configuration and mode presets
//! - [`job`]: child-process analysis and conversion jobs
//! - [`controlled_vocabulary`]: the accession vocabulary shared with the engine

#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![allow(clippy::too_many_arguments)]

pub mod controlled_vocabulary;
pub mod conversion;
pub mod engine;
pub mod job;
pub mod rpc;
pub mod session;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::controlled_vocabulary::{Accession, AccessionTag, NumericFormat};
    pub use crate::conversion::{CompressionConfig, CompressionMode, ConfigError};
    pub use crate::engine::{
        AccessionMetadata, Descriptor, Engine, EngineFault, EngineRequest, EngineResponse,
        FileType, PositionIndex, StreamRole,
    };
    pub use crate::job::{ConversionJob, ConversionJobRunner, JobConfig, JobHandle, JobSpec};
    pub use crate::rpc::{RpcChannel, RpcConfig, RpcError};
    pub use crate::session::{
        FileSession, SessionError, SessionRegistry, SessionStatus, Spectrum, TicTable,
    };
}
