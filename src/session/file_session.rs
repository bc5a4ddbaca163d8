use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::conversion::CompressionConfig;
use crate::engine::{
    AccessionMetadata, ConversionPlan, Descriptor, EngineRequest, FileType, MapToken,
    PositionIndex, StreamRole,
};
use crate::rpc::{RpcChannel, RpcError};

use super::cache::SingleFlight;
use super::error::SessionError;
use super::naming;
use super::spectrum::{MsLevelSummary, Spectrum, TicEntry, TicTable};

/// Spectra decoded concurrently while building a TIC table
const TIC_DECODE_CONCURRENCY: usize = 4;

/// Lifecycle of a [`FileSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Constructed, open not yet attempted
    Created,
    /// Open sequence running
    Opening,
    /// Descriptor, map, size and type acquired
    Opened,
    /// Terminal
    Closed,
}

/// Derived fields memoized per session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivedField {
    /// Accession metadata
    Metadata,
    /// Position index
    PositionIndex,
}

/// Single-flight key: (session, field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    /// Owning session
    pub session: Uuid,
    /// Derived field
    pub field: DerivedField,
}

/// Engine handles acquired by a successful open
#[derive(Debug, Clone, Copy)]
struct Handles {
    descriptor: Descriptor,
    map: MapToken,
    size: u64,
    file_type: FileType,
}

enum State {
    Created,
    Opening,
    Opened(Handles),
    Closed,
}

/// Per-file state machine over the engine RPC channel.
///
/// A session moves `Created -> Opening -> Opened -> Closed`. Derived fields
/// (metadata, position index) are resolved on demand and memoized; concurrent
/// callers share one in-flight derivation. Every operation after
/// [`close`](Self::close) fails with [`SessionError::Closed`].
///
/// # Drop
///
/// Dropping a session that is still open posts a close-descriptor request
/// without waiting for it and logs a warning.
pub struct FileSession {
    id: Uuid,
    path: PathBuf,
    filename: String,
    rpc: RpcChannel,
    cancel: CancellationToken,
    state: Mutex<State>,
    metadata: SingleFlight<FieldKey, AccessionMetadata, SessionError>,
    positions: SingleFlight<FieldKey, Arc<PositionIndex>, SessionError>,
}

impl FileSession {
    /// Create an unopened session.
    ///
    /// `cancel` is the session's own token; closing the session cancels it.
    pub fn new(path: impl Into<PathBuf>, rpc: RpcChannel, cancel: CancellationToken) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id: Uuid::new_v4(),
            path,
            filename,
            rpc,
            cancel,
            state: Mutex::new(State::Created),
            metadata: SingleFlight::new(),
            positions: SingleFlight::new(),
        }
    }

    /// Create and open a session in one step
    pub async fn open_path(
        path: impl Into<PathBuf>,
        rpc: RpcChannel,
        cancel: CancellationToken,
    ) -> Result<Self, SessionError> {
        let session = Self::new(path, rpc, cancel);
        session.open().await?;
        Ok(session)
    }

    /// Unique session id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Path the session was opened with
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionStatus {
        match *self.lock_state() {
            State::Created => SessionStatus::Created,
            State::Opening => SessionStatus::Opening,
            State::Opened(_) => SessionStatus::Opened,
            State::Closed => SessionStatus::Closed,
        }
    }

    /// Whether the session is in the `Opened` state
    pub fn is_open(&self) -> bool {
        self.status() == SessionStatus::Opened
    }

    /// Engine descriptor, once opened
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.opened_handles().map(|h| h.descriptor)
    }

    /// Map token, once opened
    pub fn map_token(&self) -> Option<MapToken> {
        self.opened_handles().map(|h| h.map)
    }

    /// File size in bytes, once opened
    pub fn size(&self) -> Option<u64> {
        self.opened_handles().map(|h| h.size)
    }

    /// Classified file type, once opened
    pub fn file_type(&self) -> Option<FileType> {
        self.opened_handles().map(|h| h.file_type)
    }

    /// Run the open sequence: descriptor, map, size, classify.
    ///
    /// Each step depends on the previous one. Any failure aborts the open,
    /// releases a descriptor that was already issued and leaves the session
    /// closed. A type code outside the known set fails with
    /// [`SessionError::InvalidFileType`].
    pub async fn open(&self) -> Result<(), SessionError> {
        {
            let mut state = self.lock_state();
            match *state {
                State::Created => *state = State::Opening,
                State::Closed => return Err(self.closed_error()),
                State::Opening | State::Opened(_) => {
                    return Err(SessionError::Open {
                        path: self.path.clone(),
                        reason: "session already opened".to_string(),
                    })
                }
            }
        }

        match self.open_sequence().await {
            Ok(handles) => {
                let closed_meanwhile = {
                    let mut state = self.lock_state();
                    match *state {
                        State::Closed => true,
                        _ => {
                            *state = State::Opened(handles);
                            false
                        }
                    }
                };
                if closed_meanwhile {
                    self.release(handles.descriptor).await;
                    return Err(self.closed_error());
                }
                info!(
                    "opened {} as {} ({}, {} bytes)",
                    self.path.display(),
                    handles.descriptor,
                    handles.file_type,
                    handles.size
                );
                Ok(())
            }
            Err(e) => {
                *self.lock_state() = State::Closed;
                self.cancel.cancel();
                Err(e)
            }
        }
    }

    async fn open_sequence(&self) -> Result<Handles, SessionError> {
        let descriptor = self
            .rpc
            .open_path(&self.path, &self.cancel)
            .await
            .map_err(|e| self.open_error(e))?;
        if !descriptor.is_valid() {
            return Err(SessionError::Open {
                path: self.path.clone(),
                reason: format!("engine returned descriptor {}", descriptor.0),
            });
        }

        let acquired = async {
            let map = self
                .rpc
                .map(descriptor, &self.cancel)
                .await
                .map_err(|e| self.open_error(e))?;
            let size = self
                .rpc
                .size(&self.path, &self.cancel)
                .await
                .map_err(|e| self.open_error(e))?;
            let code = self
                .rpc
                .classify(descriptor, map, &self.cancel)
                .await
                .map_err(|e| self.open_error(e))?;
            let file_type = FileType::from_code(code);
            if file_type == FileType::Unknown {
                return Err(SessionError::InvalidFileType {
                    path: self.path.clone(),
                    code,
                });
            }
            Ok(Handles {
                descriptor,
                map,
                size,
                file_type,
            })
        }
        .await;

        if acquired.is_err() {
            self.release(descriptor).await;
        }
        acquired
    }

    /// Engine type classification of the open file
    pub fn classify(&self) -> Result<FileType, SessionError> {
        self.handles().map(|h| h.file_type)
    }

    /// Accession metadata, resolved once and shared by concurrent callers
    pub async fn metadata(&self) -> Result<AccessionMetadata, SessionError> {
        let handles = self.handles()?;
        let outcome = self
            .metadata
            .get_or_resolve(self.key(DerivedField::Metadata), || {
                self.fetch_metadata(handles)
            })
            .await;
        self.handles()?;
        outcome
    }

    async fn fetch_metadata(&self, handles: Handles) -> Result<AccessionMetadata, SessionError> {
        self.rpc
            .metadata(handles.descriptor, handles.map, &self.cancel)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Metadata if it has already been resolved
    pub fn cached_metadata(&self) -> Option<AccessionMetadata> {
        self.metadata.cached(&self.key(DerivedField::Metadata))
    }

    /// Position index, resolved once after metadata.
    ///
    /// The index is checked for one entry per spectrum in every parallel
    /// array before it is cached.
    pub async fn position_index(&self) -> Result<Arc<PositionIndex>, SessionError> {
        let handles = self.handles()?;
        let metadata = self.metadata().await?;
        let outcome = self
            .positions
            .get_or_resolve(self.key(DerivedField::PositionIndex), || {
                self.fetch_positions(handles, metadata)
            })
            .await;
        self.handles()?;
        outcome
    }

    async fn fetch_positions(
        &self,
        handles: Handles,
        metadata: AccessionMetadata,
    ) -> Result<Arc<PositionIndex>, SessionError> {
        let expected = metadata.source_total_spec as usize;
        let index = self
            .rpc
            .positions(handles.descriptor, handles.map, metadata, &self.cancel)
            .await
            .map_err(|e| self.rpc_error(e))?;
        index.validate(Some(expected))?;
        Ok(Arc::new(index))
    }

    /// Decode a byte range of the m/z stream.
    ///
    /// Fails with [`SessionError::MetadataUnresolved`] unless metadata has
    /// already been resolved.
    pub async fn decode_range(&self, start: u64, end: u64) -> Result<Vec<f64>, SessionError> {
        self.decode_range_as(StreamRole::Mz, start, end).await
    }

    /// Decode a byte range using the numeric format of `role`
    pub async fn decode_range_as(
        &self,
        role: StreamRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<f64>, SessionError> {
        let handles = self.handles()?;
        if role == StreamRole::Xml {
            return Err(SessionError::UnsupportedFormat { role });
        }
        let metadata = self
            .cached_metadata()
            .ok_or(SessionError::MetadataUnresolved)?;
        self.rpc
            .decode_range(
                handles.descriptor,
                handles.map,
                metadata,
                role,
                start,
                end,
                &self.cancel,
            )
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Assemble one spectrum from the position index and two decodes
    pub async fn spectrum(&self, index: usize) -> Result<Spectrum, SessionError> {
        let positions = self.position_index().await?;
        let count = positions.spectrum_count();
        let out_of_bounds = SessionError::IndexOutOfBounds { index, count };
        if index >= count {
            return Err(out_of_bounds);
        }
        let (mz_start, mz_end) = positions.mz.range(index).ok_or(out_of_bounds.clone())?;
        let (in_start, in_end) = positions.inten.range(index).ok_or(out_of_bounds)?;

        let (mz, intensity) = tokio::try_join!(
            self.decode_range_as(StreamRole::Mz, mz_start, mz_end),
            self.decode_range_as(StreamRole::Intensity, in_start, in_end),
        )?;

        Ok(Spectrum {
            index,
            scan: positions.scans[index],
            retention_time: positions.retention_times[index],
            ms_level: positions.ms_levels[index],
            mz,
            intensity,
        })
    }

    /// Ordinals whose MS level equals `level`, ascending
    pub async fn filter_by_ms_level(&self, level: u32) -> Result<Vec<usize>, SessionError> {
        Ok(self.position_index().await?.ordinals_at_level(level))
    }

    /// Spectrum counts for MS1, MS2 and MSn
    pub async fn ms_level_summary(&self) -> Result<MsLevelSummary, SessionError> {
        Ok(MsLevelSummary::from_levels(
            &self.position_index().await?.ms_levels,
        ))
    }

    /// Decode every MS1 spectrum with its total ion current
    pub async fn tic_table(&self) -> Result<TicTable, SessionError> {
        let ms1 = self.filter_by_ms_level(1).await?;
        let entries: Vec<TicEntry> = futures::stream::iter(ms1)
            .map(|index| self.spectrum(index))
            .buffered(TIC_DECODE_CONCURRENCY)
            .map_ok(TicEntry::from)
            .try_collect()
            .await?;
        Ok(TicTable { entries })
    }

    /// Raw bytes from the mapped file
    pub async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, SessionError> {
        let handles = self.handles()?;
        self.rpc
            .read_range(handles.descriptor, handles.map, offset, length, &self.cancel)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Ask the engine for a partition plan over this file.
    ///
    /// Requires a SourceXml session. The configuration is validated before
    /// anything is dispatched.
    pub async fn prepare_conversion(
        &self,
        config: &CompressionConfig,
    ) -> Result<ConversionPlan, SessionError> {
        config.validate()?;
        let handles = self.handles()?;
        if handles.file_type != FileType::SourceXml {
            return Err(SessionError::UnsupportedOperation {
                operation: "prepare_conversion",
                file_type: handles.file_type,
            });
        }
        let positions = self.position_index().await?;
        let metadata = self.metadata().await?;
        self.rpc
            .prepare(positions, metadata, config.clone(), &self.cancel)
            .await
            .map_err(|e| self.rpc_error(e))
    }

    /// Convert the file into `destination`.
    ///
    /// SourceXml and ExternalConvertible files are compressed, CompressedBinary
    /// files decompressed. Resolves only once the engine has finished; a
    /// non-zero engine status fails with [`SessionError::Conversion`]. The
    /// output descriptor is released either way.
    pub async fn convert(
        &self,
        destination: &Path,
        config: &CompressionConfig,
    ) -> Result<PathBuf, SessionError> {
        config.validate()?;
        let handles = self.handles()?;

        let plan = match handles.file_type {
            FileType::SourceXml => Some((
                self.metadata().await?,
                self.prepare_conversion(config).await?,
            )),
            _ => None,
        };

        let output = self
            .rpc
            .open_output(destination, &self.cancel)
            .await
            .map_err(|e| self.rpc_error(e))?;
        if !output.is_valid() {
            return Err(SessionError::Open {
                path: destination.to_path_buf(),
                reason: format!("engine returned output descriptor {}", output.0),
            });
        }

        info!(
            "converting {} ({}) -> {}",
            self.path.display(),
            handles.file_type,
            destination.display()
        );
        let status = match handles.file_type {
            FileType::CompressedBinary => {
                self.rpc
                    .decompress(
                        handles.descriptor,
                        handles.map,
                        output,
                        config.clone(),
                        &self.cancel,
                    )
                    .await
            }
            _ => {
                let (metadata, plan) = match plan {
                    Some((metadata, plan)) => (Some(metadata), Some(plan)),
                    None => (None, None),
                };
                self.rpc
                    .compress(
                        handles.descriptor,
                        handles.map,
                        metadata,
                        plan,
                        output,
                        config.clone(),
                        &self.cancel,
                    )
                    .await
            }
        };
        self.release(output).await;

        let status = status.map_err(|e| self.rpc_error(e))?;
        if status != 0 {
            warn!(
                "conversion of {} exited with status {}",
                self.path.display(),
                status
            );
            return Err(SessionError::Conversion { status });
        }
        Ok(destination.to_path_buf())
    }

    /// Output path for converting this file into `directory`
    pub fn output_path(&self, directory: &Path) -> Result<PathBuf, SessionError> {
        let file_type = self.handles()?.file_type;
        naming::output_path(directory, &self.path, file_type).ok_or(
            SessionError::UnsupportedOperation {
                operation: "output_path",
                file_type,
            },
        )
    }

    /// Release the descriptor and move to `Closed`.
    ///
    /// Derivations still in flight fail with [`SessionError::Closed`]. A
    /// second close fails with [`SessionError::Closed`]; the descriptor is
    /// released exactly once.
    pub async fn close(&self) -> Result<(), SessionError> {
        let descriptor = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, State::Closed) {
                State::Opened(handles) => Some(handles.descriptor),
                State::Closed => return Err(self.closed_error()),
                State::Created | State::Opening => None,
            }
        };
        self.cancel.cancel();
        self.metadata.invalidate_all();
        self.positions.invalidate_all();

        if let Some(descriptor) = descriptor {
            let status = self
                .rpc
                .close_descriptor(descriptor, &CancellationToken::new())
                .await?;
            if status != 0 {
                return Err(SessionError::Release { descriptor, status });
            }
            info!("closed {} ({})", self.path.display(), descriptor);
        }
        Ok(())
    }

    /// Move to `Closed` without releasing the descriptor.
    pub(crate) fn detach(&self) {
        *self.lock_state() = State::Closed;
        self.cancel.cancel();
        self.metadata.invalidate_all();
        self.positions.invalidate_all();
    }

    /// Release a descriptor outside the normal close path, logging failures.
    async fn release(&self, descriptor: Descriptor) {
        match self
            .rpc
            .close_descriptor(descriptor, &CancellationToken::new())
            .await
        {
            Ok(0) => debug!("released {} for {}", descriptor, self.path.display()),
            Ok(status) => warn!("releasing {} returned status {}", descriptor, status),
            Err(e) => warn!("failed to release {}: {}", descriptor, e),
        }
    }

    fn key(&self, field: DerivedField) -> FieldKey {
        FieldKey {
            session: self.id,
            field,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn opened_handles(&self) -> Option<Handles> {
        match *self.lock_state() {
            State::Opened(handles) => Some(handles),
            _ => None,
        }
    }

    fn handles(&self) -> Result<Handles, SessionError> {
        match *self.lock_state() {
            State::Opened(handles) => Ok(handles),
            State::Closed => Err(self.closed_error()),
            State::Created | State::Opening => Err(SessionError::NotOpen {
                path: self.path.clone(),
            }),
        }
    }

    fn closed_error(&self) -> SessionError {
        SessionError::Closed {
            target: self.path.display().to_string(),
        }
    }

    fn rpc_error(&self, error: RpcError) -> SessionError {
        match error {
            RpcError::Cancelled { .. } if self.cancel.is_cancelled() => self.closed_error(),
            other => SessionError::Rpc(other),
        }
    }

    fn open_error(&self, error: RpcError) -> SessionError {
        match error {
            RpcError::Cancelled { .. } if self.cancel.is_cancelled() => self.closed_error(),
            other => SessionError::Open {
                path: self.path.clone(),
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Debug for FileSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSession")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("status", &self.status())
            .field("descriptor", &self.descriptor())
            .field("file_type", &self.file_type())
            .finish()
    }
}

impl Drop for FileSession {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .map(|state| std::mem::replace(state, State::Closed))
            .unwrap_or_else(|poisoned| std::mem::replace(poisoned.into_inner(), State::Closed));
        self.cancel.cancel();
        if let State::Opened(handles) = state {
            warn!(
                "session for {} dropped without close, releasing {}",
                self.path.display(),
                handles.descriptor
            );
            if let Err(e) = self.rpc.post(EngineRequest::CloseDescriptor {
                descriptor: handles.descriptor,
            }) {
                warn!("could not release {}: {}", handles.descriptor, e);
            }
        }
    }
}
