//! Value types shared across the engine boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controlled_vocabulary::{Accession, AccessionTag, NumericFormat, SourceCompression};

/// Engine-issued handle identifying an open file
///
/// Only strictly positive values name a live descriptor; the engine reports
/// failure to open with zero or a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor(pub i64);

impl Descriptor {
    /// Whether the engine accepted the open request
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

/// Opaque reference to an engine-managed memory mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MapToken(pub u64);

/// File type assigned by content inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// Verbose XML spectra (mzML)
    SourceXml,
    /// Compact binary form (msz)
    CompressedBinary,
    /// Vendor file convertible through an external tool
    ExternalConvertible,
    /// Anything the engine did not recognize
    Unknown,
}

impl FileType {
    /// Map an engine type code
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => FileType::SourceXml,
            2 => FileType::CompressedBinary,
            5 => FileType::ExternalConvertible,
            _ => FileType::Unknown,
        }
    }

    /// Engine type code (0 for unknown)
    pub fn code(&self) -> i64 {
        match self {
            FileType::SourceXml => 1,
            FileType::CompressedBinary => 2,
            FileType::ExternalConvertible => 5,
            FileType::Unknown => 0,
        }
    }

    /// Whether converting this file compresses (as opposed to decompresses)
    pub fn compresses(&self) -> bool {
        matches!(self, FileType::SourceXml | FileType::ExternalConvertible)
    }

    /// Short display label
    pub fn label(&self) -> &'static str {
        match self {
            FileType::SourceXml => "mzML",
            FileType::CompressedBinary => "msz",
            FileType::ExternalConvertible => "external",
            FileType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Logical stream inside a spectrum file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamRole {
    /// m/z array
    Mz,
    /// Intensity array
    Intensity,
    /// XML/metadata stream
    Xml,
}

impl StreamRole {
    /// Vocabulary tag for this role
    pub fn tag(&self) -> AccessionTag {
        match self {
            StreamRole::Mz => AccessionTag::Mass,
            StreamRole::Intensity => AccessionTag::Intensity,
            StreamRole::Xml => AccessionTag::Xml,
        }
    }
}

/// Source format description of a file, keyed by accession
///
/// Fields the session layer does not know about are kept in `extra` and
/// survive a round trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessionMetadata {
    /// Numeric format of the m/z stream
    pub source_mz_fmt: Accession,
    /// Numeric format of the intensity stream
    pub source_inten_fmt: Accession,
    /// Compression codec of the binary streams
    pub source_compression: Accession,
    /// Number of spectra in the file
    pub source_total_spec: u64,
    /// Unrecognized fields, passed through opaquely
    #[serde(flatten, default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl AccessionMetadata {
    /// Metadata with no pass-through fields
    pub fn new(
        source_mz_fmt: impl Into<Accession>,
        source_inten_fmt: impl Into<Accession>,
        source_compression: impl Into<Accession>,
        source_total_spec: u64,
    ) -> Self {
        Self {
            source_mz_fmt: source_mz_fmt.into(),
            source_inten_fmt: source_inten_fmt.into(),
            source_compression: source_compression.into(),
            source_total_spec,
            extra: BTreeMap::new(),
        }
    }

    /// Resolved numeric format of the m/z stream
    pub fn mz_format(&self) -> Option<NumericFormat> {
        self.source_mz_fmt.tag().and_then(NumericFormat::from_tag)
    }

    /// Resolved numeric format of the intensity stream
    pub fn inten_format(&self) -> Option<NumericFormat> {
        self.source_inten_fmt.tag().and_then(NumericFormat::from_tag)
    }

    /// Numeric format for a stream role; the xml stream has none
    pub fn format_for(&self, role: StreamRole) -> Option<NumericFormat> {
        match role {
            StreamRole::Mz => self.mz_format(),
            StreamRole::Intensity => self.inten_format(),
            StreamRole::Xml => None,
        }
    }

    /// Resolved source compression codec
    pub fn compression(&self) -> Option<SourceCompression> {
        self.source_compression.tag().and_then(SourceCompression::from_tag)
    }
}

/// Ordered start/end byte offsets of one stream, one entry per spectrum
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPositions {
    /// Inclusive start offsets
    pub start_positions: Vec<u64>,
    /// Exclusive end offsets
    pub end_positions: Vec<u64>,
}

impl StreamPositions {
    /// Append one (start, end) range
    pub fn push(&mut self, start: u64, end: u64) {
        self.start_positions.push(start);
        self.end_positions.push(end);
    }

    /// Number of ranges
    pub fn len(&self) -> usize {
        self.start_positions.len()
    }

    /// Whether no ranges are recorded
    pub fn is_empty(&self) -> bool {
        self.start_positions.is_empty()
    }

    /// The (start, end) range of an ordinal
    pub fn range(&self, ordinal: usize) -> Option<(u64, u64)> {
        Some((
            *self.start_positions.get(ordinal)?,
            *self.end_positions.get(ordinal)?,
        ))
    }
}

/// Shape violation in a [`PositionIndex`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionIndexError {
    /// A parallel array does not have one entry per spectrum
    #[error("{field} has {actual} entries, expected {expected}")]
    LengthMismatch {
        /// Offending array
        field: &'static str,
        /// Spectrum count
        expected: usize,
        /// Observed length
        actual: usize,
    },
    /// A range ends before it starts
    #[error("{stream} range {ordinal} ends before it starts")]
    InvertedRange {
        /// Offending stream
        stream: &'static str,
        /// Spectrum ordinal
        ordinal: usize,
    },
}

/// Per-spectrum byte-range index over the three logical streams
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionIndex {
    /// m/z binary payload ranges
    pub mz: StreamPositions,
    /// Intensity binary payload ranges
    pub inten: StreamPositions,
    /// Spectrum XML ranges
    pub xml: StreamPositions,
    /// Scan number per spectrum
    pub scans: Vec<i64>,
    /// Retention time in seconds per spectrum
    pub retention_times: Vec<f64>,
    /// MS level per spectrum
    pub ms_levels: Vec<u32>,
}

impl PositionIndex {
    /// Number of spectra covered by the index
    pub fn spectrum_count(&self) -> usize {
        self.scans.len()
    }

    /// Check that every parallel array has one entry per spectrum.
    ///
    /// When `expected` is given (the metadata spectrum count) the index must
    /// also cover exactly that many spectra.
    pub fn validate(&self, expected: Option<usize>) -> Result<(), PositionIndexError> {
        let count = expected.unwrap_or(self.scans.len());
        let lengths = [
            ("scans", self.scans.len()),
            ("retention_times", self.retention_times.len()),
            ("ms_levels", self.ms_levels.len()),
            ("mz.start_positions", self.mz.start_positions.len()),
            ("mz.end_positions", self.mz.end_positions.len()),
            ("inten.start_positions", self.inten.start_positions.len()),
            ("inten.end_positions", self.inten.end_positions.len()),
            ("xml.start_positions", self.xml.start_positions.len()),
            ("xml.end_positions", self.xml.end_positions.len()),
        ];
        for (field, actual) in lengths {
            if actual != count {
                return Err(PositionIndexError::LengthMismatch {
                    field,
                    expected: count,
                    actual,
                });
            }
        }
        for (stream, positions) in [("mz", &self.mz), ("inten", &self.inten), ("xml", &self.xml)] {
            let inverted = positions
                .start_positions
                .iter()
                .zip(&positions.end_positions)
                .position(|(start, end)| end < start);
            if let Some(ordinal) = inverted {
                return Err(PositionIndexError::InvertedRange { stream, ordinal });
            }
        }
        Ok(())
    }

    /// Ranges of a stream role
    pub fn stream(&self, role: StreamRole) -> &StreamPositions {
        match role {
            StreamRole::Mz => &self.mz,
            StreamRole::Intensity => &self.inten,
            StreamRole::Xml => &self.xml,
        }
    }

    /// Ordinals whose MS level equals `level`, in ascending order
    pub fn ordinals_at_level(&self, level: u32) -> Vec<usize> {
        self.ms_levels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == level)
            .map(|(i, _)| i)
            .collect()
    }

    /// Distinct MS levels present
    pub fn levels(&self) -> BTreeSet<u32> {
        self.ms_levels.iter().copied().collect()
    }
}

/// Opaque partition plan produced by `prepare` and consumed by `compress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionPlan(pub serde_json::Value);

impl ConversionPlan {
    /// Wrap any serializable plan
    pub fn from_serializable<T: Serialize>(plan: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(plan).map(ConversionPlan)
    }

    /// Interpret the plan as a concrete type
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.0)
    }
}
