use std::path::PathBuf;

use thiserror::Error;

use crate::conversion::ConfigError;
use crate::engine::{Descriptor, FileType, PositionIndexError, StreamRole};
use crate::rpc::RpcError;

/// Errors returned by [`super::FileSession`] and [`super::SessionRegistry`]
///
/// `Clone` so one derivation outcome can be handed to every coalesced caller.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The engine did not issue a usable descriptor, or a later open step failed
    #[error("failed to open {}: {reason}", path.display())]
    Open {
        /// Path being opened
        path: PathBuf,
        /// Cause
        reason: String,
    },

    /// Operation attempted before the open sequence completed
    #[error("session for {} is not open", path.display())]
    NotOpen {
        /// Session path
        path: PathBuf,
    },

    /// Operation attempted after close
    #[error("session {target} is closed")]
    Closed {
        /// Session path or descriptor
        target: String,
    },

    /// Spectrum index outside `[0, count)`
    #[error("spectrum index {index} out of bounds (spectrum count {count})")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Spectrum count
        count: usize,
    },

    /// Classification returned a code outside the known set
    #[error("{} has unrecognized file type code {code}", path.display())]
    InvalidFileType {
        /// Session path
        path: PathBuf,
        /// Raw engine type code
        code: i64,
    },

    /// Engine-side compress/decompress failure
    #[error("conversion failed with exit status {status}")]
    Conversion {
        /// Engine exit status
        status: i32,
    },

    /// Decode requested before metadata was resolved
    #[error("metadata has not been resolved for this session")]
    MetadataUnresolved,

    /// The engine returned an inconsistent position index
    #[error("malformed position index: {0}")]
    MalformedIndex(#[from] PositionIndexError),

    /// The stream has no numeric format to decode with
    #[error("{role:?} stream cannot be decoded as numbers")]
    UnsupportedFormat {
        /// Requested stream
        role: StreamRole,
    },

    /// The operation does not apply to this file type
    #[error("{operation} is not supported for {file_type} files")]
    UnsupportedOperation {
        /// Operation name
        operation: &'static str,
        /// Session file type
        file_type: FileType,
    },

    /// Compression configuration rejected before dispatch
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport failure
    #[error(transparent)]
    Rpc(#[from] RpcError),

    /// The engine refused to release a descriptor
    #[error("failed to release {descriptor}: status {status}")]
    Release {
        /// Descriptor being released
        descriptor: Descriptor,
        /// Engine status
        status: i32,
    },

    /// The engine issued a descriptor that already has a live session
    #[error("{0} already has a live session")]
    DuplicateDescriptor(Descriptor),
}
