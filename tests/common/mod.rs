//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use base64::prelude::*;
use base64::Engine as _;

use mszsession::controlled_vocabulary::{AccessionTag, NumericFormat};
use mszsession::engine::mzml::BinaryDecoder;
use mszsession::engine::{
    AccessionMetadata, Descriptor, Engine, EngineFault, EngineRequest, EngineResponse, MapToken,
    PositionIndex, StreamRole,
};
use mszsession::rpc::{RpcChannel, RpcConfig};
use mszsession::session::SessionRegistry;

/// One synthetic spectrum
#[derive(Debug, Clone)]
pub struct SpectrumFixture {
    pub ms_level: u32,
    pub retention_time: f64,
    pub mz: Vec<f64>,
    pub intensity: Vec<f32>,
}

/// `count` spectra, every fifth one MS1, with `peaks` peaks each
pub fn spectra(count: usize, peaks: usize) -> Vec<SpectrumFixture> {
    (0..count)
        .map(|i| SpectrumFixture {
            ms_level: if i % 5 == 0 { 1 } else { 2 },
            retention_time: i as f64 * 1.5,
            mz: (0..peaks)
                .map(|j| 100.0 + j as f64 * 10.0 + i as f64 * 0.25)
                .collect(),
            intensity: (0..peaks).map(|j| 1000.0 + j as f32 * 50.0).collect(),
        })
        .collect()
}

/// Spectra with explicit MS levels and `peaks` peaks each
pub fn spectra_with_levels(levels: &[u32], peaks: usize) -> Vec<SpectrumFixture> {
    let mut fixtures = spectra(levels.len(), peaks);
    for (fixture, level) in fixtures.iter_mut().zip(levels) {
        fixture.ms_level = *level;
    }
    fixtures
}

/// Engine that serves raw little-endian arrays laid out back to back,
/// m/z as 64-bit floats and intensity as 32-bit floats.
pub struct ScriptedEngine {
    pub type_code: i64,
    pub compress_status: i32,
    pub metadata_delay: Duration,
    bytes: Vec<u8>,
    index: PositionIndex,
    next_descriptor: AtomicI64,
    calls: Mutex<HashMap<&'static str, usize>>,
    closed: Mutex<Vec<Descriptor>>,
    conversions: Mutex<Vec<EngineRequest>>,
}

impl ScriptedEngine {
    pub fn new(fixtures: &[SpectrumFixture]) -> Self {
        let mut bytes = Vec::new();
        let mut index = PositionIndex::default();
        for (i, fixture) in fixtures.iter().enumerate() {
            let xml_start = bytes.len() as u64;
            bytes.extend_from_slice(b"<spectrum>");

            let start = bytes.len() as u64;
            bytes.extend(fixture.mz.iter().flat_map(|v| v.to_le_bytes()));
            index.mz.push(start, bytes.len() as u64);

            let start = bytes.len() as u64;
            bytes.extend(fixture.intensity.iter().flat_map(|v| v.to_le_bytes()));
            index.inten.push(start, bytes.len() as u64);

            bytes.extend_from_slice(b"</spectrum>");
            index.xml.push(xml_start, bytes.len() as u64);
            index.scans.push(i as i64 + 1);
            index.retention_times.push(fixture.retention_time);
            index.ms_levels.push(fixture.ms_level);
        }
        Self {
            type_code: 1,
            compress_status: 0,
            metadata_delay: Duration::ZERO,
            bytes,
            index,
            next_descriptor: AtomicI64::new(3),
            calls: Mutex::new(HashMap::new()),
            closed: Mutex::new(Vec::new()),
            conversions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_type_code(mut self, type_code: i64) -> Self {
        self.type_code = type_code;
        self
    }

    pub fn with_compress_status(mut self, status: i32) -> Self {
        self.compress_status = status;
        self
    }

    pub fn with_metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = delay;
        self
    }

    /// Number of requests seen for an operation tag
    pub fn calls(&self, tag: &str) -> usize {
        self.calls.lock().unwrap().get(tag).copied().unwrap_or(0)
    }

    pub fn closed(&self) -> Vec<Descriptor> {
        self.closed.lock().unwrap().clone()
    }

    pub fn conversions(&self) -> Vec<EngineRequest> {
        self.conversions.lock().unwrap().clone()
    }

    pub fn index(&self) -> &PositionIndex {
        &self.index
    }

    fn metadata(&self) -> AccessionMetadata {
        AccessionMetadata::new(
            AccessionTag::Float64,
            AccessionTag::Float32,
            AccessionTag::NoCompression,
            self.index.spectrum_count() as u64,
        )
    }
}

impl Engine for ScriptedEngine {
    fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineFault> {
        *self.calls.lock().unwrap().entry(request.tag()).or_insert(0) += 1;
        match request {
            EngineRequest::OpenPath { .. } | EngineRequest::OpenOutput { .. } => {
                let descriptor = self.next_descriptor.fetch_add(1, Ordering::SeqCst);
                Ok(EngineResponse::Descriptor(Descriptor(descriptor)))
            }
            EngineRequest::CloseDescriptor { descriptor } => {
                self.closed.lock().unwrap().push(descriptor);
                Ok(EngineResponse::Status(0))
            }
            EngineRequest::Size { .. } => Ok(EngineResponse::Size(self.bytes.len() as u64)),
            EngineRequest::Map { descriptor } => {
                Ok(EngineResponse::Map(MapToken(descriptor.0 as u64 * 100)))
            }
            EngineRequest::Classify { .. } => Ok(EngineResponse::TypeCode(self.type_code)),
            EngineRequest::Metadata { .. } => {
                thread::sleep(self.metadata_delay);
                Ok(EngineResponse::Metadata(self.metadata()))
            }
            EngineRequest::Positions { .. } => Ok(EngineResponse::Positions(self.index.clone())),
            EngineRequest::DecodeRange {
                metadata,
                role,
                start,
                end,
                ..
            } => {
                let format = metadata
                    .format_for(role)
                    .ok_or_else(|| EngineFault::new("no format"))?;
                let slice = self
                    .bytes
                    .get(start as usize..end as usize)
                    .ok_or_else(|| EngineFault::new("range outside file"))?;
                BinaryDecoder::bytes_to_values(slice, format)
                    .map(EngineResponse::Values)
                    .map_err(|e| EngineFault::new(e.to_string()))
            }
            EngineRequest::ReadRange { offset, length, .. } => {
                let end = (offset + length) as usize;
                self.bytes
                    .get(offset as usize..end)
                    .map(|b| EngineResponse::Bytes(b.to_vec()))
                    .ok_or_else(|| EngineFault::new("range outside file"))
            }
            EngineRequest::Prepare { positions, .. } => Ok(EngineResponse::Plan(
                mszsession::engine::ConversionPlan(serde_json::json!({
                    "spectra": positions.spectrum_count()
                })),
            )),
            request @ (EngineRequest::Compress { .. } | EngineRequest::Decompress { .. }) => {
                self.conversions.lock().unwrap().push(request);
                Ok(EngineResponse::Status(self.compress_status))
            }
            EngineRequest::ThreadCount => Ok(EngineResponse::ThreadCount(4)),
            EngineRequest::CodecVersion => Ok(EngineResponse::Version("scripted/1".to_string())),
        }
    }
}

/// A registry over `engine` with a small worker pool
pub fn registry_for<E: Engine>(engine: Arc<E>) -> SessionRegistry {
    let channel = RpcChannel::spawn(engine, RpcConfig::default().with_workers(4)).unwrap();
    SessionRegistry::new(channel)
}

/// Expected element count for a decoded range
pub fn element_count(range: (u64, u64), role: StreamRole, format: NumericFormat) -> usize {
    assert_ne!(role, StreamRole::Xml);
    ((range.1 - range.0) as usize) / format.element_size()
}

/// Write an mzML document holding `fixtures`; zlib-compresses arrays when asked
pub fn write_mzml(dir: &Path, name: &str, fixtures: &[SpectrumFixture], zlib: bool) -> PathBuf {
    let encode = |raw: Vec<u8>| -> String {
        if zlib {
            use flate2::write::ZlibEncoder;
            use std::io::Write;
            let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&raw).unwrap();
            BASE64_STANDARD.encode(encoder.finish().unwrap())
        } else {
            BASE64_STANDARD.encode(raw)
        }
    };
    let compression = if zlib {
        r#"<cvParam cvRef="MS" accession="MS:1000574" name="zlib compression"/>"#
    } else {
        r#"<cvParam cvRef="MS" accession="MS:1000576" name="no compression"/>"#
    };

    let mut mzml = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<indexedmzML xmlns="http://psi.hupo.org/ms/mzml">
<mzML xmlns="http://psi.hupo.org/ms/mzml" version="1.1.0">
  <run id="fixture">
    <spectrumList count="{}" defaultDataProcessingRef="dp">"#,
        fixtures.len()
    );
    for (i, fixture) in fixtures.iter().enumerate() {
        let mz = encode(fixture.mz.iter().flat_map(|v| v.to_le_bytes()).collect());
        let intensity = encode(fixture.intensity.iter().flat_map(|v| v.to_le_bytes()).collect());
        mzml.push_str(&format!(
            r#"
      <spectrum index="{i}" id="controllerType=0 controllerNumber=1 scan={scan}" defaultArrayLength="{len}">
        <cvParam cvRef="MS" accession="MS:1000511" name="ms level" value="{level}"/>
        <scanList count="1">
          <scan>
            <cvParam cvRef="MS" accession="MS:1000016" name="scan start time" value="{rt}" unitCvRef="UO" unitAccession="UO:0000010" unitName="second"/>
          </scan>
        </scanList>
        <binaryDataArrayList count="2">
          <binaryDataArray encodedLength="{mz_len}">
            <cvParam cvRef="MS" accession="MS:1000523" name="64-bit float"/>
            {compression}
            <cvParam cvRef="MS" accession="MS:1000514" name="m/z array" unitCvRef="MS" unitAccession="MS:1000040" unitName="m/z"/>
            <binary>{mz}</binary>
          </binaryDataArray>
          <binaryDataArray encodedLength="{in_len}">
            <cvParam cvRef="MS" accession="MS:1000521" name="32-bit float"/>
            {compression}
            <cvParam cvRef="MS" accession="MS:1000515" name="intensity array" unitCvRef="MS" unitAccession="MS:1000131" unitName="number of detector counts"/>
            <binary>{intensity}</binary>
          </binaryDataArray>
        </binaryDataArrayList>
      </spectrum>"#,
            i = i,
            scan = i + 1,
            len = fixture.mz.len(),
            level = fixture.ms_level,
            rt = fixture.retention_time,
            mz_len = mz.len(),
            in_len = intensity.len(),
            compression = compression,
            mz = mz,
            intensity = intensity,
        ));
    }
    mzml.push_str(
        r#"
    </spectrumList>
  </run>
</mzML>
</indexedmzML>
"#,
    );

    let path = dir.join(name);
    std::fs::write(&path, mzml).unwrap();
    path
}
