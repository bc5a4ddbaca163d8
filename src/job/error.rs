use std::time::Duration;

use thiserror::Error;

/// Errors raised while running a job
#[derive(Debug, Error)]
pub enum JobError {
    /// The program could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The job was cancelled and its process killed
    #[error("job cancelled")]
    Cancelled,

    /// The job ran past its timeout and its process was killed
    #[error("job timed out after {0:?}")]
    TimedOut(Duration),

    /// Reading the job's output failed
    #[error("I/O error while running job: {0}")]
    Io(#[from] std::io::Error),

    /// The driving task panicked or was aborted
    #[error("job task failed: {0}")]
    Task(String),
}
