//! # Accession vocabulary
//!
//! The engine describes numeric formats, compression codecs, stream roles and
//! compression/transform directives with controlled-vocabulary accessions.
//! Numeric accessions come from the HUPO-PSI MS vocabulary (`MS:10005xx`) and
//! the msz directive range (`47000xx`). On the session side every accession is
//! carried under its symbolic tag (`_32f_`, `_zlib_`, ...).
//!
//! The vocabulary is open: an accession the session layer does not recognize
//! is never an error. It is carried through unchanged as
//! [`Accession::Unrecognized`] so that a newer engine can extend the table
//! without breaking older callers.
//!
//! ## Reference
//! - OBO file: https://raw.githubusercontent.com/HUPO-PSI/psi-ms-CV/master/psi-ms.obo

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Broad grouping of vocabulary tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagCategory {
    /// Numeric element format of a binary stream
    NumericFormat,
    /// Source compression codec of a binary stream
    Compression,
    /// Semantic role of a stream (m/z, intensity, xml)
    Role,
    /// Target compression or transform directive
    Directive,
}

/// A recognized symbolic tag of the accession vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessionTag {
    /// `_32i_` - 32-bit integer (MS:1000519)
    Int32,
    /// `_16e_` - 16-bit encoded float (MS:1000520)
    Encoded16,
    /// `_32f_` - 32-bit float (MS:1000521)
    Float32,
    /// `_64i_` - 64-bit integer (MS:1000522)
    Int64,
    /// `_64d_` - 64-bit double (MS:1000523)
    Float64,
    /// `_zlib_` - zlib compression (MS:1000574)
    Zlib,
    /// `_no_comp_` - no compression (MS:1000576)
    NoCompression,
    /// `_xml_` - xml/metadata stream (MS:1000513)
    Xml,
    /// `_mass_` - m/z array (MS:1000514)
    Mass,
    /// `_intensity_` - intensity array (MS:1000515)
    Intensity,
    /// `_lossless_`
    Lossless,
    /// `_ZSTD_compression_`
    ZstdCompression,
    /// `_LZ4_compression_` (symbolic only, no numeric accession)
    Lz4Compression,
    /// `_cast_64_to_32_`
    Cast64To32,
    /// `_cast_64_to_16_`
    Cast64To16,
    /// `_log2_transform_`
    Log2Transform,
    /// `_delta16_transform_`
    Delta16Transform,
    /// `_delta24_transform_`
    Delta24Transform,
    /// `_delta32_transform_`
    Delta32Transform,
    /// `_vdelta16_transform_`
    VDelta16Transform,
    /// `_vdelta24_transform_`
    VDelta24Transform,
    /// `_vbr_`
    Vbr,
    /// `_bitpack_`
    Bitpack,
}

impl AccessionTag {
    /// Every recognized tag, in vocabulary order
    pub const ALL: [AccessionTag; 23] = [
        AccessionTag::Int32,
        AccessionTag::Encoded16,
        AccessionTag::Float32,
        AccessionTag::Int64,
        AccessionTag::Float64,
        AccessionTag::Zlib,
        AccessionTag::NoCompression,
        AccessionTag::Xml,
        AccessionTag::Mass,
        AccessionTag::Intensity,
        AccessionTag::Lossless,
        AccessionTag::ZstdCompression,
        AccessionTag::Lz4Compression,
        AccessionTag::Cast64To32,
        AccessionTag::Cast64To16,
        AccessionTag::Log2Transform,
        AccessionTag::Delta16Transform,
        AccessionTag::Delta24Transform,
        AccessionTag::Delta32Transform,
        AccessionTag::VDelta16Transform,
        AccessionTag::VDelta24Transform,
        AccessionTag::Vbr,
        AccessionTag::Bitpack,
    ];

    /// The symbolic form used on the session side (e.g. `_32f_`)
    pub fn symbol(&self) -> &'static str {
        match self {
            AccessionTag::Int32 => "_32i_",
            AccessionTag::Encoded16 => "_16e_",
            AccessionTag::Float32 => "_32f_",
            AccessionTag::Int64 => "_64i_",
            AccessionTag::Float64 => "_64d_",
            AccessionTag::Zlib => "_zlib_",
            AccessionTag::NoCompression => "_no_comp_",
            AccessionTag::Xml => "_xml_",
            AccessionTag::Mass => "_mass_",
            AccessionTag::Intensity => "_intensity_",
            AccessionTag::Lossless => "_lossless_",
            AccessionTag::ZstdCompression => "_ZSTD_compression_",
            AccessionTag::Lz4Compression => "_LZ4_compression_",
            AccessionTag::Cast64To32 => "_cast_64_to_32_",
            AccessionTag::Cast64To16 => "_cast_64_to_16_",
            AccessionTag::Log2Transform => "_log2_transform_",
            AccessionTag::Delta16Transform => "_delta16_transform_",
            AccessionTag::Delta24Transform => "_delta24_transform_",
            AccessionTag::Delta32Transform => "_delta32_transform_",
            AccessionTag::VDelta16Transform => "_vdelta16_transform_",
            AccessionTag::VDelta24Transform => "_vdelta24_transform_",
            AccessionTag::Vbr => "_vbr_",
            AccessionTag::Bitpack => "_bitpack_",
        }
    }

    /// The numeric accession the engine reports for this tag
    pub fn accession(&self) -> Option<i64> {
        let code = match self {
            AccessionTag::Int32 => 1000519,
            AccessionTag::Encoded16 => 1000520,
            AccessionTag::Float32 => 1000521,
            AccessionTag::Int64 => 1000522,
            AccessionTag::Float64 => 1000523,
            AccessionTag::Zlib => 1000574,
            AccessionTag::NoCompression => 1000576,
            AccessionTag::Xml => 1000513,
            AccessionTag::Mass => 1000514,
            AccessionTag::Intensity => 1000515,
            AccessionTag::Lossless => 4700000,
            AccessionTag::ZstdCompression => 4700001,
            AccessionTag::Cast64To32 => 4700002,
            AccessionTag::Log2Transform => 4700003,
            AccessionTag::Delta16Transform => 4700004,
            AccessionTag::Delta24Transform => 4700005,
            AccessionTag::Delta32Transform => 4700006,
            AccessionTag::Vbr => 4700007,
            AccessionTag::Bitpack => 4700008,
            AccessionTag::VDelta16Transform => 4700009,
            AccessionTag::VDelta24Transform => 4700010,
            AccessionTag::Cast64To16 => 4700011,
            AccessionTag::Lz4Compression => return None,
        };
        Some(code)
    }

    /// Look up a tag by its symbolic form
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|tag| tag.symbol() == symbol)
    }

    /// Look up a tag by its numeric accession
    pub fn from_accession(accession: i64) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.accession() == Some(accession))
    }

    /// Category this tag belongs to
    pub fn category(&self) -> TagCategory {
        match self {
            AccessionTag::Int32
            | AccessionTag::Encoded16
            | AccessionTag::Float32
            | AccessionTag::Int64
            | AccessionTag::Float64 => TagCategory::NumericFormat,
            AccessionTag::Zlib | AccessionTag::NoCompression => TagCategory::Compression,
            AccessionTag::Xml | AccessionTag::Mass | AccessionTag::Intensity => TagCategory::Role,
            _ => TagCategory::Directive,
        }
    }

    /// Whether this tag selects a target codec (as opposed to a lossy transform)
    pub fn is_codec_directive(&self) -> bool {
        matches!(
            self,
            AccessionTag::Lossless
                | AccessionTag::ZstdCompression
                | AccessionTag::Lz4Compression
                | AccessionTag::NoCompression
        )
    }

    /// Whether this tag may appear in a compression configuration target field
    pub fn is_target_directive(&self) -> bool {
        self.category() == TagCategory::Directive || *self == AccessionTag::NoCompression
    }
}

impl fmt::Display for AccessionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Raw wire form of an accession: a number or a string
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAccession {
    /// Numeric accession as reported by the engine
    Number(i64),
    /// Symbolic or otherwise textual accession
    Text(String),
}

impl fmt::Display for RawAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawAccession::Number(n) => write!(f, "{}", n),
            RawAccession::Text(s) => f.write_str(s),
        }
    }
}

/// An accession value from the open vocabulary
///
/// Serializes as the symbolic tag when recognized and as the original raw
/// value otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawAccession", into = "RawAccession")]
pub enum Accession {
    /// A tag from the known vocabulary
    Known(AccessionTag),
    /// Anything else, passed through opaquely
    Unrecognized(RawAccession),
}

impl Accession {
    /// The recognized tag, if any
    pub fn tag(&self) -> Option<AccessionTag> {
        match self {
            Accession::Known(tag) => Some(*tag),
            Accession::Unrecognized(_) => None,
        }
    }

    /// Whether this accession is part of the known vocabulary
    pub fn is_known(&self) -> bool {
        matches!(self, Accession::Known(_))
    }

    /// Resolve a numeric accession
    pub fn from_number(accession: i64) -> Self {
        match AccessionTag::from_accession(accession) {
            Some(tag) => Accession::Known(tag),
            None => Accession::Unrecognized(RawAccession::Number(accession)),
        }
    }

    /// Resolve a CV-prefixed accession such as `MS:1000521`
    pub fn from_cv(cv_accession: &str) -> Self {
        let digits = cv_accession
            .split_once(':')
            .map(|(_, rest)| rest)
            .unwrap_or(cv_accession);
        match digits.trim().parse::<i64>() {
            Ok(n) => Self::from_number(n),
            Err(_) => Accession::Unrecognized(RawAccession::Text(cv_accession.to_string())),
        }
    }
}

impl From<AccessionTag> for Accession {
    fn from(tag: AccessionTag) -> Self {
        Accession::Known(tag)
    }
}

impl From<RawAccession> for Accession {
    fn from(raw: RawAccession) -> Self {
        match raw {
            RawAccession::Number(n) => Accession::from_number(n),
            RawAccession::Text(s) => match AccessionTag::from_symbol(&s) {
                Some(tag) => Accession::Known(tag),
                None => Accession::Unrecognized(RawAccession::Text(s)),
            },
        }
    }
}

impl From<Accession> for RawAccession {
    fn from(accession: Accession) -> Self {
        match accession {
            Accession::Known(tag) => RawAccession::Text(tag.symbol().to_string()),
            Accession::Unrecognized(raw) => raw,
        }
    }
}

impl FromStr for Accession {
    type Err = Infallible;

    /// Parses a symbolic tag, a CV accession (`MS:1000521`) or a bare number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(tag) = AccessionTag::from_symbol(s) {
            return Ok(Accession::Known(tag));
        }
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Accession::from_number(n));
        }
        if s.contains(':') {
            return Ok(Accession::from_cv(s));
        }
        Ok(Accession::Unrecognized(RawAccession::Text(s.to_string())))
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accession::Known(tag) => write!(f, "{}", tag),
            Accession::Unrecognized(raw) => write!(f, "{}", raw),
        }
    }
}

/// Numeric element format of a binary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericFormat {
    /// 32-bit little-endian float
    Float32,
    /// 64-bit little-endian double
    Float64,
    /// 32-bit little-endian integer
    Int32,
    /// 64-bit little-endian integer
    Int64,
    /// 16-bit encoded (half precision) float
    Encoded16,
}

impl NumericFormat {
    /// Map a vocabulary tag to a numeric format
    pub fn from_tag(tag: AccessionTag) -> Option<Self> {
        match tag {
            AccessionTag::Float32 => Some(NumericFormat::Float32),
            AccessionTag::Float64 => Some(NumericFormat::Float64),
            AccessionTag::Int32 => Some(NumericFormat::Int32),
            AccessionTag::Int64 => Some(NumericFormat::Int64),
            AccessionTag::Encoded16 => Some(NumericFormat::Encoded16),
            _ => None,
        }
    }

    /// The vocabulary tag for this format
    pub fn tag(&self) -> AccessionTag {
        match self {
            NumericFormat::Float32 => AccessionTag::Float32,
            NumericFormat::Float64 => AccessionTag::Float64,
            NumericFormat::Int32 => AccessionTag::Int32,
            NumericFormat::Int64 => AccessionTag::Int64,
            NumericFormat::Encoded16 => AccessionTag::Encoded16,
        }
    }

    /// Bytes per element
    pub fn element_size(&self) -> usize {
        match self {
            NumericFormat::Float32 | NumericFormat::Int32 => 4,
            NumericFormat::Float64 | NumericFormat::Int64 => 8,
            NumericFormat::Encoded16 => 2,
        }
    }
}

/// Source compression codec of a binary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceCompression {
    /// Stored uncompressed
    None,
    /// zlib/deflate
    Zlib,
}

impl SourceCompression {
    /// Map a vocabulary tag to a codec
    pub fn from_tag(tag: AccessionTag) -> Option<Self> {
        match tag {
            AccessionTag::NoCompression => Some(SourceCompression::None),
            AccessionTag::Zlib => Some(SourceCompression::Zlib),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_and_accession_lookup() {
        assert_eq!(AccessionTag::from_accession(1000521), Some(AccessionTag::Float32));
        assert_eq!(AccessionTag::from_accession(4700011), Some(AccessionTag::Cast64To16));
        assert_eq!(AccessionTag::from_symbol("_zlib_"), Some(AccessionTag::Zlib));
        assert_eq!(
            AccessionTag::from_symbol("_LZ4_compression_"),
            Some(AccessionTag::Lz4Compression)
        );
        assert_eq!(AccessionTag::Lz4Compression.accession(), None);
        assert_eq!(AccessionTag::from_symbol("_nope_"), None);
    }

    #[test]
    fn test_unrecognized_accessions_pass_through() {
        let number: Accession = serde_json::from_str("1002312").unwrap();
        assert_eq!(number, Accession::Unrecognized(RawAccession::Number(1002312)));
        assert_eq!(serde_json::to_string(&number).unwrap(), "1002312");

        let text: Accession = serde_json::from_str("\"_future_codec_\"").unwrap();
        assert!(!text.is_known());
        assert_eq!(serde_json::to_string(&text).unwrap(), "\"_future_codec_\"");
    }

    #[test]
    fn test_numeric_accessions_serialize_symbolically() {
        let acc: Accession = serde_json::from_str("1000523").unwrap();
        assert_eq!(acc.tag(), Some(AccessionTag::Float64));
        assert_eq!(serde_json::to_string(&acc).unwrap(), "\"_64d_\"");
    }

    #[test]
    fn test_parse_cv_prefixed() {
        assert_eq!(Accession::from_cv("MS:1000574"), Accession::Known(AccessionTag::Zlib));
        let parsed: Accession = "MS:1000576".parse().unwrap();
        assert_eq!(parsed.tag(), Some(AccessionTag::NoCompression));
        assert_eq!(Accession::from_cv("MS:1002312").to_string(), "1002312");
    }

    #[test]
    fn test_categories() {
        assert_eq!(AccessionTag::Float32.category(), TagCategory::NumericFormat);
        assert_eq!(AccessionTag::Zlib.category(), TagCategory::Compression);
        assert_eq!(AccessionTag::Mass.category(), TagCategory::Role);
        assert!(AccessionTag::ZstdCompression.is_target_directive());
        assert!(AccessionTag::Delta24Transform.is_target_directive());
        assert!(!AccessionTag::Float64.is_target_directive());
        assert!(!AccessionTag::Vbr.is_codec_directive());
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(NumericFormat::Float32.element_size(), 4);
        assert_eq!(NumericFormat::Float64.element_size(), 8);
        assert_eq!(NumericFormat::Int64.element_size(), 8);
        assert_eq!(NumericFormat::Encoded16.element_size(), 2);
    }
}
