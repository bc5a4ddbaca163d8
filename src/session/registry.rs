use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::engine::Descriptor;
use crate::rpc::RpcChannel;

use super::error::SessionError;
use super::file_session::FileSession;

/// Owns the live sessions, keyed by engine descriptor.
///
/// At most one live session exists per descriptor. Each session gets a child
/// of the registry's cancellation token, so dropping or shutting down the
/// registry cancels every in-flight derivation. Sessions closed directly
/// through [`FileSession::close`] are pruned on the next registry access,
/// which frees their descriptor for reuse by the engine.
pub struct SessionRegistry {
    rpc: RpcChannel,
    sessions: Mutex<HashMap<Descriptor, Arc<FileSession>>>,
    cancel: CancellationToken,
}

impl SessionRegistry {
    /// Create an empty registry over a channel
    pub fn new(rpc: RpcChannel) -> Self {
        Self {
            rpc,
            sessions: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// The channel sessions are opened on
    pub fn rpc(&self) -> &RpcChannel {
        &self.rpc
    }

    /// Open a path and register the session under its descriptor
    pub async fn open(&self, path: impl AsRef<Path>) -> Result<Arc<FileSession>, SessionError> {
        let path = path.as_ref();
        let session =
            FileSession::open_path(path, self.rpc.clone(), self.cancel.child_token()).await?;
        let descriptor = session.descriptor().ok_or_else(|| SessionError::NotOpen {
            path: path.to_path_buf(),
        })?;
        let session = Arc::new(session);

        let duplicate = {
            let mut sessions = self.live_sessions();
            if sessions.contains_key(&descriptor) {
                true
            } else {
                sessions.insert(descriptor, Arc::clone(&session));
                false
            }
        };
        if duplicate {
            warn!(
                "engine reissued live {} for {}, discarding new session",
                descriptor,
                path.display()
            );
            // The existing session owns the descriptor; do not release it twice.
            session.detach();
            return Err(SessionError::DuplicateDescriptor(descriptor));
        }
        Ok(session)
    }

    /// Open every path in order, one result per path.
    ///
    /// Takes a file-dialog selection unchanged; a failure on one path does
    /// not stop the others.
    pub async fn open_many<I, P>(
        &self,
        paths: I,
    ) -> Vec<(PathBuf, Result<Arc<FileSession>, SessionError>)>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut results = Vec::new();
        for path in paths {
            let path = path.into();
            let result = self.open(&path).await;
            results.push((path, result));
        }
        results
    }

    /// Remove a session and release its descriptor
    pub async fn close(&self, descriptor: Descriptor) -> Result<(), SessionError> {
        let session = self
            .live_sessions()
            .remove(&descriptor)
            .ok_or_else(|| SessionError::Closed {
                target: descriptor.to_string(),
            })?;
        session.close().await
    }

    /// Close every live session, returning how many were closed cleanly
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<_> = self.live_sessions().drain().collect();
        let mut closed = 0;
        for (descriptor, session) in sessions {
            match session.close().await {
                Ok(()) => closed += 1,
                Err(e) => warn!("failed to close {}: {}", descriptor, e),
            }
        }
        if closed > 0 {
            info!("closed {} sessions", closed);
        }
        closed
    }

    /// The live session for a descriptor
    pub fn lookup(&self, descriptor: Descriptor) -> Option<Arc<FileSession>> {
        self.live_sessions().get(&descriptor).cloned()
    }

    /// Live sessions ordered by descriptor
    pub fn list(&self) -> Vec<Arc<FileSession>> {
        let mut sessions: Vec<_> = self
            .live_sessions()
            .iter()
            .map(|(descriptor, session)| (*descriptor, Arc::clone(session)))
            .collect();
        sessions.sort_by_key(|(descriptor, _)| *descriptor);
        sessions.into_iter().map(|(_, session)| session).collect()
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.live_sessions().len()
    }

    /// Whether no sessions are live
    pub fn is_empty(&self) -> bool {
        self.live_sessions().is_empty()
    }

    /// Lock the table after dropping sessions that were closed directly
    fn live_sessions(&self) -> MutexGuard<'_, HashMap<Descriptor, Arc<FileSession>>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.retain(|descriptor, session| {
            let live = session.is_open();
            if !live {
                debug!("pruning closed session for {}", descriptor);
            }
            live
        });
        sessions
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
