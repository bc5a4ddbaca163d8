//! In-process engine for mzML files.
//!
//! Reads are served from a memory mapping of the source file: metadata and
//! the position index come from a single quick-xml pass, and numeric arrays
//! are decoded straight from the mapped Base64 text. Conversions run the
//! external `mscompress` program.

pub mod binary;
pub mod plan;
pub mod scan;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info, warn};
use memmap2::Mmap;

use crate::conversion::CompressionConfig;
use crate::engine::protocol::{Engine, EngineFault, EngineRequest, EngineResponse};
use crate::engine::types::{
    AccessionMetadata, ConversionPlan, Descriptor, FileType, MapToken, PositionIndex, StreamRole,
};

pub use binary::{BinaryDecodeError, BinaryDecoder};
pub use plan::{plan_divisions, Division, DivisionPlan, DEFAULT_BLOCKSIZE};
pub use scan::{scan_metadata, scan_positions, ScanError};

/// First descriptor handed out; 0-2 are never issued
const FIRST_DESCRIPTOR: i64 = 3;

/// Magic number at the start of every msz file
pub const MSZ_MAGIC: u32 = 0x035F_51B5;

/// How far into a file `classify` looks for the mzML root element
const PROLOG_WINDOW: usize = 4096;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct MzMLEngineConfig {
    /// Program run for compress and decompress
    pub mscompress_program: PathBuf,
    /// Division size for compression plans, in bytes
    pub blocksize: u64,
}

impl Default for MzMLEngineConfig {
    fn default() -> Self {
        Self {
            mscompress_program: PathBuf::from("mscompress"),
            blocksize: DEFAULT_BLOCKSIZE,
        }
    }
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    mapping: Option<(MapToken, Arc<Mmap>)>,
}

/// Engine serving mzML files from memory mappings
pub struct MzMLEngine {
    config: MzMLEngineConfig,
    next_descriptor: AtomicI64,
    next_map: AtomicU64,
    files: DashMap<Descriptor, OpenFile>,
}

impl MzMLEngine {
    /// Create an engine
    pub fn new(config: MzMLEngineConfig) -> Self {
        Self {
            config,
            next_descriptor: AtomicI64::new(FIRST_DESCRIPTOR),
            next_map: AtomicU64::new(1),
            files: DashMap::new(),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &MzMLEngineConfig {
        &self.config
    }

    /// Number of descriptors currently open
    pub fn open_count(&self) -> usize {
        self.files.len()
    }

    fn register(&self, path: PathBuf) -> Descriptor {
        let descriptor = Descriptor(self.next_descriptor.fetch_add(1, Ordering::Relaxed));
        self.files.insert(
            descriptor,
            OpenFile {
                path,
                mapping: None,
            },
        );
        descriptor
    }

    fn open_path(&self, path: PathBuf) -> Descriptor {
        match File::open(&path) {
            Ok(_) => {
                let descriptor = self.register(path);
                debug!("opened {} as {}", self.path_of(descriptor).display(), descriptor);
                descriptor
            }
            Err(e) => {
                warn!("cannot open {}: {}", path.display(), e);
                Descriptor(-1)
            }
        }
    }

    fn open_output(&self, path: PathBuf) -> Descriptor {
        match File::create(&path) {
            Ok(_) => self.register(path),
            Err(e) => {
                warn!("cannot create {}: {}", path.display(), e);
                Descriptor(-1)
            }
        }
    }

    fn path_of(&self, descriptor: Descriptor) -> PathBuf {
        self.files
            .get(&descriptor)
            .map(|file| file.path.clone())
            .unwrap_or_default()
    }

    fn file_path(&self, descriptor: Descriptor) -> Result<PathBuf, EngineFault> {
        self.files
            .get(&descriptor)
            .map(|file| file.path.clone())
            .ok_or_else(|| EngineFault::new(format!("unknown descriptor {}", descriptor)))
    }

    fn map(&self, descriptor: Descriptor) -> Result<MapToken, EngineFault> {
        let mut file = self
            .files
            .get_mut(&descriptor)
            .ok_or_else(|| EngineFault::new(format!("unknown descriptor {}", descriptor)))?;
        if let Some((token, _)) = &file.mapping {
            return Ok(*token);
        }

        let handle = File::open(&file.path)
            .map_err(|e| EngineFault::new(format!("{}: {}", file.path.display(), e)))?;
        let len = handle
            .metadata()
            .map_err(|e| EngineFault::new(format!("{}: {}", file.path.display(), e)))?
            .len();
        if len == 0 {
            return Err(EngineFault::new(format!(
                "{}: cannot map an empty file",
                file.path.display()
            )));
        }
        // The file is opened read-only and kept for the lifetime of the descriptor.
        let mmap = unsafe { Mmap::map(&handle) }
            .map_err(|e| EngineFault::new(format!("{}: {}", file.path.display(), e)))?;

        let token = MapToken(self.next_map.fetch_add(1, Ordering::Relaxed));
        debug!("mapped {} bytes of {} as map {}", len, descriptor, token.0);
        file.mapping = Some((token, Arc::new(mmap)));
        Ok(token)
    }

    fn mapped(&self, descriptor: Descriptor, map: MapToken) -> Result<Arc<Mmap>, EngineFault> {
        let file = self
            .files
            .get(&descriptor)
            .ok_or_else(|| EngineFault::new(format!("unknown descriptor {}", descriptor)))?;
        match &file.mapping {
            Some((token, mmap)) if *token == map => Ok(Arc::clone(mmap)),
            Some(_) => Err(EngineFault::new(format!(
                "map {} does not belong to {}",
                map.0, descriptor
            ))),
            None => Err(EngineFault::new(format!("{} is not mapped", descriptor))),
        }
    }

    fn decode_range(
        &self,
        descriptor: Descriptor,
        map: MapToken,
        metadata: &AccessionMetadata,
        role: StreamRole,
        start: u64,
        end: u64,
    ) -> Result<Vec<f64>, EngineFault> {
        let format = metadata.format_for(role).ok_or_else(|| {
            EngineFault::new(format!("no numeric format for {:?} stream", role))
        })?;
        let compression = metadata.compression().ok_or_else(|| {
            EngineFault::new(format!(
                "unsupported source compression {}",
                metadata.source_compression
            ))
        })?;
        let mmap = self.mapped(descriptor, map)?;
        let text = slice(&mmap, start, end)?;
        BinaryDecoder::decode(text, format, compression)
            .map_err(|e| EngineFault::new(format!("{} [{}..{}]: {}", descriptor, start, end, e)))
    }

    fn prepare(
        &self,
        positions: &PositionIndex,
        metadata: &AccessionMetadata,
        config: &CompressionConfig,
    ) -> Result<ConversionPlan, EngineFault> {
        config
            .validate()
            .map_err(|e| EngineFault::new(e.to_string()))?;
        let plan = plan_divisions(positions, self.config.blocksize, config.thread_count);
        info!(
            "planned {} divisions of up to {} bytes for {} spectra",
            plan.divisions.len(),
            plan.blocksize,
            metadata.source_total_spec
        );
        ConversionPlan::from_serializable(&plan).map_err(|e| EngineFault::new(e.to_string()))
    }

    fn compress(
        &self,
        descriptor: Descriptor,
        output: Descriptor,
        plan: Option<&ConversionPlan>,
        config: &CompressionConfig,
    ) -> Result<i32, EngineFault> {
        let mut args = config
            .mscompress_args()
            .map_err(|e| EngineFault::new(e.to_string()))?;
        let blocksize = plan
            .and_then(|plan| plan.decode::<DivisionPlan>().ok())
            .map(|plan| plan.blocksize)
            .unwrap_or(self.config.blocksize);
        args.push("-b".to_string());
        args.push(blocksize.to_string());
        Ok(self.run_mscompress(args, &self.file_path(descriptor)?, &self.file_path(output)?))
    }

    fn decompress(
        &self,
        descriptor: Descriptor,
        output: Descriptor,
        config: &CompressionConfig,
    ) -> Result<i32, EngineFault> {
        let args = vec!["-t".to_string(), config.thread_count.max(1).to_string()];
        Ok(self.run_mscompress(args, &self.file_path(descriptor)?, &self.file_path(output)?))
    }

    /// Run `mscompress`, returning its exit status or -1
    fn run_mscompress(&self, mut args: Vec<String>, input: &Path, output: &Path) -> i32 {
        args.push(input.display().to_string());
        args.push(output.display().to_string());
        info!(
            "running {} {}",
            self.config.mscompress_program.display(),
            args.join(" ")
        );

        let result = Command::new(&self.config.mscompress_program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();
        match result {
            Ok(out) => {
                let status = out.status.code().unwrap_or(-1);
                if status != 0 {
                    for line in String::from_utf8_lossy(&out.stderr).lines() {
                        warn!("mscompress: {}", line);
                    }
                }
                status
            }
            Err(e) => {
                warn!(
                    "failed to run {}: {}",
                    self.config.mscompress_program.display(),
                    e
                );
                -1
            }
        }
    }
}

impl Default for MzMLEngine {
    fn default() -> Self {
        Self::new(MzMLEngineConfig::default())
    }
}

impl Engine for MzMLEngine {
    fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineFault> {
        match request {
            EngineRequest::OpenPath { path } => {
                Ok(EngineResponse::Descriptor(self.open_path(path)))
            }
            EngineRequest::OpenOutput { path } => {
                Ok(EngineResponse::Descriptor(self.open_output(path)))
            }
            EngineRequest::CloseDescriptor { descriptor } => {
                let status = match self.files.remove(&descriptor) {
                    Some(_) => 0,
                    None => -1,
                };
                Ok(EngineResponse::Status(status))
            }
            EngineRequest::Size { path } => std::fs::metadata(&path)
                .map(|meta| EngineResponse::Size(meta.len()))
                .map_err(|e| EngineFault::new(format!("{}: {}", path.display(), e))),
            EngineRequest::Map { descriptor } => self.map(descriptor).map(EngineResponse::Map),
            EngineRequest::Classify { descriptor, map } => {
                let mmap = self.mapped(descriptor, map)?;
                Ok(EngineResponse::TypeCode(classify(&mmap).code()))
            }
            EngineRequest::Metadata { descriptor, map } => {
                let mmap = self.mapped(descriptor, map)?;
                scan_metadata(&mmap)
                    .map(EngineResponse::Metadata)
                    .map_err(|e| EngineFault::new(e.to_string()))
            }
            EngineRequest::Positions {
                descriptor, map, ..
            } => {
                let mmap = self.mapped(descriptor, map)?;
                scan_positions(&mmap)
                    .map(EngineResponse::Positions)
                    .map_err(|e| EngineFault::new(e.to_string()))
            }
            EngineRequest::DecodeRange {
                descriptor,
                map,
                metadata,
                role,
                start,
                end,
            } => self
                .decode_range(descriptor, map, &metadata, role, start, end)
                .map(EngineResponse::Values),
            EngineRequest::ReadRange {
                descriptor,
                map,
                offset,
                length,
            } => {
                let mmap = self.mapped(descriptor, map)?;
                let end = offset.saturating_add(length);
                slice(&mmap, offset, end).map(|bytes| EngineResponse::Bytes(bytes.to_vec()))
            }
            EngineRequest::Prepare {
                positions,
                metadata,
                config,
            } => self
                .prepare(&positions, &metadata, &config)
                .map(EngineResponse::Plan),
            EngineRequest::Compress {
                descriptor,
                output,
                plan,
                config,
                ..
            } => self
                .compress(descriptor, output, plan.as_ref(), &config)
                .map(EngineResponse::Status),
            EngineRequest::Decompress {
                descriptor,
                output,
                config,
                ..
            } => self
                .decompress(descriptor, output, &config)
                .map(EngineResponse::Status),
            EngineRequest::ThreadCount => Ok(EngineResponse::ThreadCount(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            )),
            EngineRequest::CodecVersion => Ok(EngineResponse::Version(format!(
                "mszsession-mzml/{}",
                env!("CARGO_PKG_VERSION")
            ))),
        }
    }
}

/// Bounds-checked view of `[start, end)` in a mapping
fn slice(data: &[u8], start: u64, end: u64) -> Result<&[u8], EngineFault> {
    let len = data.len() as u64;
    if start > end || end > len {
        return Err(EngineFault::new(format!(
            "range {}..{} outside mapped region of {} bytes",
            start, end, len
        )));
    }
    Ok(&data[start as usize..end as usize])
}

/// Identify a file from its leading bytes
pub fn classify(data: &[u8]) -> FileType {
    if data.len() >= 4 && u32::from_le_bytes([data[0], data[1], data[2], data[3]]) == MSZ_MAGIC {
        return FileType::CompressedBinary;
    }
    if is_thermo_raw(data) {
        return FileType::ExternalConvertible;
    }

    let window = &data[..data.len().min(PROLOG_WINDOW)];
    let window = window.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(window);
    let start = window
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(window.len());
    let window = &window[start..];
    if window.starts_with(b"<?xml")
        || window.starts_with(b"<mzML")
        || window.starts_with(b"<indexedmzML")
    {
        let has_root = window.windows(5).any(|w| w == b"<mzML")
            || window.windows(12).any(|w| w == b"<indexedmzML");
        if has_root {
            return FileType::SourceXml;
        }
    }
    FileType::Unknown
}

/// Thermo RAW files start with `01 A1` followed by "Finnigan" in UTF-16LE
fn is_thermo_raw(data: &[u8]) -> bool {
    let signature = "Finnigan".encode_utf16().flat_map(|unit| unit.to_le_bytes());
    data.len() >= 18
        && data[0] == 0x01
        && data[1] == 0xA1
        && data[2..18].iter().copied().eq(signature)
}
