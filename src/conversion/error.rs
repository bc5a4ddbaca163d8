use thiserror::Error;

use crate::controlled_vocabulary::Accession;

/// Errors raised while building or checking a compression configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Mode name outside the preset list
    #[error("unknown compression mode '{0}' (valid: fastest, faster, default, better)")]
    UnknownMode(String),

    /// Thread count must be at least one
    #[error("thread_count must be >= 1, got {0}")]
    InvalidThreadCount(usize),

    /// A target field holds something other than a compression/transform directive
    #[error("{field} must be a compression or transform directive, got '{value}'")]
    UnsupportedTarget {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: Accession,
    },

    /// The directive has no command-line spelling for this stream
    #[error("{field} directive '{value}' cannot be passed to mscompress")]
    NotRenderable {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: Accession,
    },
}
