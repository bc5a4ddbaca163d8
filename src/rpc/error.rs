use std::time::Duration;

use thiserror::Error;

use crate::engine::EngineFault;

/// Errors raised by the RPC channel
///
/// `Clone` so a single outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    /// No reply arrived within the call timeout
    #[error("{tag} timed out after {after:?}")]
    Timeout {
        /// Operation tag
        tag: &'static str,
        /// Timeout that elapsed
        after: Duration,
    },

    /// The caller's cancellation token fired
    #[error("{tag} cancelled")]
    Cancelled {
        /// Operation tag
        tag: &'static str,
    },

    /// The channel is shut down or its worker pool is gone
    #[error("engine channel closed")]
    ChannelClosed,

    /// The engine reported a failure
    #[error("engine failed {tag}: {fault}")]
    Engine {
        /// Operation tag
        tag: &'static str,
        /// Engine-side cause
        fault: EngineFault,
    },

    /// The engine answered with the wrong response kind
    #[error("{tag} returned unexpected {kind} response")]
    UnexpectedResponse {
        /// Operation tag
        tag: &'static str,
        /// Response kind received
        kind: &'static str,
    },

    /// A worker thread could not be started
    #[error("failed to spawn engine worker: {0}")]
    Spawn(String),
}
