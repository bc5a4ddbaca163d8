//! # Long-running jobs
//!
//! [`ConversionJobRunner`] runs analysis and conversion programs as child
//! processes and exposes three streams per job:
//!
//! - **result**: everything written to stdout, buffered and delivered with
//!   the exit status by [`JobHandle::finish`]
//! - **diagnostics**: stderr lines
//! - **progress**: stderr lines starting with the progress prefix
//!   (`PROGRESS:` by default), with the prefix stripped
//!
//! Each job can be cancelled and may carry a timeout; either kills the
//! process.

mod error;
mod runner;
mod spec;

#[cfg(test)]
mod tests;

pub use error::JobError;
pub use runner::{
    ConversionJob, ConversionJobRunner, JobConfig, JobHandle, JobState, DEFAULT_PROGRESS_PREFIX,
};
pub use spec::JobSpec;
