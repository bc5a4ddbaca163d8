//! Single-pass scans over a mapped mzML document.
//!
//! Offsets reported here are byte offsets into the document, so a range can
//! be handed back to [`super::binary::BinaryDecoder`] as a slice of the
//! mapping without reparsing.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::controlled_vocabulary::{Accession, AccessionTag, TagCategory};
use crate::engine::types::{AccessionMetadata, PositionIndex, StreamRole};

/// Errors raised while scanning a document
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// Malformed XML
    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    /// Attribute value is not UTF-8
    #[error("UTF-8 encoding error: {0}")]
    Utf8Error(#[from] std::str::Utf8Error),

    /// Document ended inside an element
    #[error("Invalid mzML structure: {0}")]
    InvalidStructure(String),
}

const MS_LEVEL: &str = "MS:1000511";
const SCAN_START_TIME: &str = "MS:1000016";
const UNIT_MINUTE: &str = "UO:0000031";

/// Read the source format of the first spectrum and the spectrum count.
///
/// The count comes from `spectrumList/@count`; when that attribute is
/// missing the spectra are counted.
pub fn scan_metadata(data: &[u8]) -> Result<AccessionMetadata, ScanError> {
    let mut reader = Reader::from_reader(data);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut declared_count: Option<u64> = None;
    let mut in_array = false;
    let mut array = ArrayParams::default();
    let mut arrays: Vec<ArrayParams> = Vec::new();
    let mut seen_spectra = 0u64;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"spectrumList" => {
                    declared_count = get_attribute(e, "count")?.and_then(|c| c.parse().ok());
                }
                b"spectrum" => {
                    seen_spectra += 1;
                    if declared_count.is_some() && !arrays.is_empty() {
                        break;
                    }
                }
                b"binaryDataArray" if seen_spectra == 1 => {
                    in_array = true;
                    array = ArrayParams::default();
                }
                b"cvParam" if in_array => {
                    if let Some(accession) = get_attribute(e, "accession")? {
                        array.record(Accession::from_cv(&accession));
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.name().as_ref() == b"binaryDataArray" && in_array => {
                in_array = false;
                arrays.push(std::mem::take(&mut array));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let role_array = |role: AccessionTag| arrays.iter().find(|a| a.role == Some(role));
    let mz_fmt = role_array(AccessionTag::Mass)
        .and_then(|a| a.format.clone())
        .unwrap_or(Accession::Known(AccessionTag::Float64));
    let inten_fmt = role_array(AccessionTag::Intensity)
        .and_then(|a| a.format.clone())
        .unwrap_or(Accession::Known(AccessionTag::Float32));
    let compression = arrays
        .iter()
        .find_map(|a| a.compression.clone())
        .unwrap_or(Accession::Known(AccessionTag::NoCompression));

    let mut metadata = AccessionMetadata::new(
        mz_fmt,
        inten_fmt,
        compression,
        declared_count.unwrap_or(seen_spectra),
    );

    let unrecognized: Vec<serde_json::Value> = arrays
        .iter()
        .flat_map(|a| a.unrecognized.iter())
        .map(|raw| serde_json::Value::String(raw.clone()))
        .collect();
    if !unrecognized.is_empty() {
        metadata.extra = BTreeMap::from([(
            "unrecognized_accessions".to_string(),
            serde_json::Value::Array(unrecognized),
        )]);
    }
    Ok(metadata)
}

#[derive(Debug, Default)]
struct ArrayParams {
    role: Option<AccessionTag>,
    format: Option<Accession>,
    compression: Option<Accession>,
    unrecognized: Vec<String>,
}

impl ArrayParams {
    fn record(&mut self, accession: Accession) {
        match accession.tag() {
            Some(tag) => match tag.category() {
                TagCategory::Role => self.role = Some(tag),
                TagCategory::NumericFormat => self.format = Some(accession),
                TagCategory::Compression => self.compression = Some(accession),
                TagCategory::Directive => {}
            },
            None => {
                // Numpress and friends: an unknown codec still has to reach
                // the caller so decoding can refuse it.
                if self.compression.is_none() {
                    self.compression = Some(accession.clone());
                }
                self.unrecognized.push(accession.to_string());
            }
        }
    }
}

/// Per-spectrum state collected while walking one `<spectrum>` element
#[derive(Debug, Default)]
struct SpectrumScan {
    xml_start: u64,
    scan: Option<i64>,
    retention_time: f64,
    ms_level: u32,
    mz: Option<(u64, u64)>,
    inten: Option<(u64, u64)>,
}

/// Build the position index: per spectrum, the byte range of the
/// `<spectrum>` element and of the Base64 text of its m/z and intensity
/// arrays, plus scan number, retention time in seconds and MS level.
pub fn scan_positions(data: &[u8]) -> Result<PositionIndex, ScanError> {
    let mut reader = Reader::from_reader(data);

    let mut buf = Vec::new();
    let mut index = PositionIndex::default();
    let mut current: Option<SpectrumScan> = None;
    let mut array_role: Option<StreamRole> = None;
    let mut in_array = false;
    let mut binary_start: Option<u64> = None;

    loop {
        let before = reader.buffer_position() as u64;
        let event = reader.read_event_into(&mut buf)?;
        let after = reader.buffer_position() as u64;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"spectrum" => {
                        let ordinal = index.spectrum_count() as i64;
                        let scan = get_attribute(e, "id")?.and_then(|id| scan_number(&id));
                        let spectrum = SpectrumScan {
                            xml_start: before,
                            scan: scan.or(Some(ordinal + 1)),
                            ms_level: 1,
                            ..SpectrumScan::default()
                        };
                        if empty {
                            finish_spectrum(&mut index, spectrum, after);
                        } else {
                            current = Some(spectrum);
                        }
                    }
                    b"binaryDataArray" if current.is_some() => {
                        in_array = true;
                        array_role = None;
                    }
                    b"cvParam" => {
                        if let Some(spectrum) = current.as_mut() {
                            let accession = get_attribute(e, "accession")?.unwrap_or_default();
                            if in_array {
                                match Accession::from_cv(&accession).tag() {
                                    Some(AccessionTag::Mass) => array_role = Some(StreamRole::Mz),
                                    Some(AccessionTag::Intensity) => {
                                        array_role = Some(StreamRole::Intensity)
                                    }
                                    _ => {}
                                }
                            } else {
                                record_spectrum_param(spectrum, e, &accession)?;
                            }
                        }
                    }
                    b"binary" if in_array => {
                        if empty {
                            assign_range(current.as_mut(), array_role, (after, after));
                        } else {
                            binary_start = Some(after);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"binary" => {
                    if let Some(start) = binary_start.take() {
                        assign_range(current.as_mut(), array_role, (start, before));
                    }
                }
                b"binaryDataArray" => {
                    in_array = false;
                    array_role = None;
                }
                b"spectrum" => {
                    if let Some(spectrum) = current.take() {
                        finish_spectrum(&mut index, spectrum, after);
                    }
                }
                _ => {}
            },
            Event::Eof => {
                if current.is_some() {
                    return Err(ScanError::InvalidStructure(
                        "document ended inside <spectrum>".to_string(),
                    ));
                }
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(index)
}

fn record_spectrum_param(
    spectrum: &mut SpectrumScan,
    e: &BytesStart,
    accession: &str,
) -> Result<(), ScanError> {
    match accession {
        MS_LEVEL => {
            if let Some(level) = get_attribute(e, "value")?.and_then(|v| v.parse().ok()) {
                spectrum.ms_level = level;
            }
        }
        SCAN_START_TIME => {
            let value: f64 = get_attribute(e, "value")?
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0);
            let unit = get_attribute(e, "unitAccession")?;
            spectrum.retention_time = if unit.as_deref() == Some(UNIT_MINUTE) {
                value * 60.0
            } else {
                value
            };
        }
        _ => {}
    }
    Ok(())
}

fn assign_range(spectrum: Option<&mut SpectrumScan>, role: Option<StreamRole>, range: (u64, u64)) {
    let Some(spectrum) = spectrum else {
        return;
    };
    match role {
        Some(StreamRole::Mz) => spectrum.mz = Some(range),
        Some(StreamRole::Intensity) => spectrum.inten = Some(range),
        _ => {}
    }
}

fn finish_spectrum(index: &mut PositionIndex, spectrum: SpectrumScan, xml_end: u64) {
    let empty = (xml_end, xml_end);
    let (mz_start, mz_end) = spectrum.mz.unwrap_or(empty);
    let (inten_start, inten_end) = spectrum.inten.unwrap_or(empty);
    index.xml.push(spectrum.xml_start, xml_end);
    index.mz.push(mz_start, mz_end);
    index.inten.push(inten_start, inten_end);
    index.scans.push(spectrum.scan.unwrap_or_default());
    index.retention_times.push(spectrum.retention_time);
    index.ms_levels.push(spectrum.ms_level);
}

/// Scan number from a native id such as
/// `controllerType=0 controllerNumber=1 scan=42`
fn scan_number(id: &str) -> Option<i64> {
    id.split_whitespace()
        .find_map(|part| part.strip_prefix("scan="))
        .and_then(|n| n.parse().ok())
}

/// Get an attribute value from an XML element
fn get_attribute(e: &BytesStart, name: &str) -> Result<Option<String>, ScanError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ScanError::XmlError(quick_xml::Error::from(e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = std::str::from_utf8(&attr.value)?.to_string();
            return Ok(Some(value));
        }
    }
    Ok(None)
}
