//! # Engine boundary
//!
//! The execution engine does the parsing, numeric decoding and
//! compression. The session layer never touches file contents directly: it
//! holds engine-issued tokens ([`Descriptor`], [`MapToken`]) and sends
//! [`EngineRequest`]s through an [`crate::rpc::RpcChannel`].
//!
//! Anything implementing [`Engine`] can sit behind the channel. The crate
//! ships one concrete engine, [`mzml::MzMLEngine`], which serves mzML files
//! in-process and shells out to `mscompress` for conversions.

pub mod mzml;
pub mod protocol;
pub mod types;

pub use protocol::{Engine, EngineFault, EngineRequest, EngineResponse, Envelope, Reply, RequestId};
pub use types::{
    AccessionMetadata, ConversionPlan, Descriptor, FileType, MapToken, PositionIndex,
    PositionIndexError, StreamPositions, StreamRole,
};
