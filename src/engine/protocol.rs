//! Request/response messages exchanged with the execution engine.
//!
//! Every request travels inside an [`Envelope`] carrying a [`RequestId`];
//! the engine side echoes the id back in its [`Reply`]. The id, not the
//! operation tag, is what pairs a reply with its caller.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conversion::CompressionConfig;

use super::types::{
    AccessionMetadata, ConversionPlan, Descriptor, MapToken, PositionIndex, StreamRole,
};

/// Correlation id attached to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An engine operation and its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineRequest {
    /// Open a path for reading
    OpenPath {
        /// File to open
        path: PathBuf,
    },
    /// Open (create/truncate) a path for writing conversion output
    OpenOutput {
        /// File to create
        path: PathBuf,
    },
    /// Release a descriptor and any mapping attached to it
    CloseDescriptor {
        /// Descriptor to release
        descriptor: Descriptor,
    },
    /// File size in bytes
    Size {
        /// File to measure
        path: PathBuf,
    },
    /// Memory-map an open descriptor
    Map {
        /// Descriptor to map
        descriptor: Descriptor,
    },
    /// Inspect content and report a type code
    Classify {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
    },
    /// Resolve accession metadata
    Metadata {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
    },
    /// Build the position index
    Positions {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
        /// Metadata resolved for this descriptor
        metadata: AccessionMetadata,
    },
    /// Decode one byte range of a stream into numbers
    DecodeRange {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
        /// Source formats and compression
        metadata: AccessionMetadata,
        /// Stream the range belongs to, which picks the numeric format
        role: StreamRole,
        /// First byte of the range
        start: u64,
        /// One past the last byte of the range
        end: u64,
    },
    /// Read raw bytes from the mapped region
    ReadRange {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
        /// First byte to read
        offset: u64,
        /// Number of bytes to read
        length: u64,
    },
    /// Compute a partition plan for compression
    Prepare {
        /// Position index of the input
        positions: Arc<PositionIndex>,
        /// Metadata of the input
        metadata: AccessionMetadata,
        /// Target formats and thread count
        config: CompressionConfig,
    },
    /// Compress into an output descriptor
    Compress {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
        /// Source metadata; absent for external inputs
        metadata: Option<AccessionMetadata>,
        /// Plan from [`EngineRequest::Prepare`]; absent for external inputs
        plan: Option<ConversionPlan>,
        /// Descriptor from [`EngineRequest::OpenOutput`]
        output: Descriptor,
        /// Target formats and thread count
        config: CompressionConfig,
    },
    /// Decompress into an output descriptor
    Decompress {
        /// Open input descriptor
        descriptor: Descriptor,
        /// Mapping of `descriptor`
        map: MapToken,
        /// Descriptor from [`EngineRequest::OpenOutput`]
        output: Descriptor,
        /// Thread count to decompress with
        config: CompressionConfig,
    },
    /// Number of worker threads the engine would use
    ThreadCount,
    /// Engine/codec identifier
    CodecVersion,
}

impl EngineRequest {
    /// Operation tag, used for logging and error reporting only
    pub fn tag(&self) -> &'static str {
        match self {
            EngineRequest::OpenPath { .. } => "open_path",
            EngineRequest::OpenOutput { .. } => "open_output",
            EngineRequest::CloseDescriptor { .. } => "close_descriptor",
            EngineRequest::Size { .. } => "size",
            EngineRequest::Map { .. } => "map",
            EngineRequest::Classify { .. } => "classify",
            EngineRequest::Metadata { .. } => "metadata",
            EngineRequest::Positions { .. } => "positions",
            EngineRequest::DecodeRange { .. } => "decode_range",
            EngineRequest::ReadRange { .. } => "read_range",
            EngineRequest::Prepare { .. } => "prepare",
            EngineRequest::Compress { .. } => "compress",
            EngineRequest::Decompress { .. } => "decompress",
            EngineRequest::ThreadCount => "thread_count",
            EngineRequest::CodecVersion => "codec_version",
        }
    }

    /// Whether this is a long-running conversion verb
    pub fn is_conversion(&self) -> bool {
        matches!(
            self,
            EngineRequest::Compress { .. } | EngineRequest::Decompress { .. }
        )
    }
}

/// Result payload of a successful engine operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum EngineResponse {
    /// A descriptor (open-path, open-output)
    Descriptor(Descriptor),
    /// An integer status (close-descriptor, compress, decompress)
    Status(i32),
    /// A byte count
    Size(u64),
    /// A mapping token
    Map(MapToken),
    /// A raw type code
    TypeCode(i64),
    /// Accession metadata
    Metadata(AccessionMetadata),
    /// A position index
    Positions(PositionIndex),
    /// A decoded numeric array
    Values(Vec<f64>),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// A partition plan
    Plan(ConversionPlan),
    /// Engine thread count
    ThreadCount(usize),
    /// Engine/codec identifier
    Version(String),
}

impl EngineResponse {
    /// Variant name, for error reporting
    pub fn kind(&self) -> &'static str {
        match self {
            EngineResponse::Descriptor(_) => "descriptor",
            EngineResponse::Status(_) => "status",
            EngineResponse::Size(_) => "size",
            EngineResponse::Map(_) => "map",
            EngineResponse::TypeCode(_) => "type_code",
            EngineResponse::Metadata(_) => "metadata",
            EngineResponse::Positions(_) => "positions",
            EngineResponse::Values(_) => "values",
            EngineResponse::Bytes(_) => "bytes",
            EngineResponse::Plan(_) => "plan",
            EngineResponse::ThreadCount(_) => "thread_count",
            EngineResponse::Version(_) => "version",
        }
    }
}

/// Engine-side failure
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineFault {
    /// Human-readable cause
    pub message: String,
}

impl EngineFault {
    /// Create a fault from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A request paired with its correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id, echoed back by the engine
    pub id: RequestId,
    /// The operation
    pub request: EngineRequest,
}

/// An engine reply carrying the echoed correlation id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    /// Correlation id of the request this answers
    pub id: RequestId,
    /// Outcome of the operation
    pub result: Result<EngineResponse, EngineFault>,
}

/// The execution engine behind the RPC boundary
///
/// Implementations are called from worker threads and may block for as long
/// as the operation takes.
pub trait Engine: Send + Sync + 'static {
    /// Execute one request
    fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineFault>;
}

impl<E: Engine + ?Sized> Engine for Arc<E> {
    fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineFault> {
        (**self).handle(request)
    }
}
