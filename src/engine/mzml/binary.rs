//! Binary data decoding for mzML
//!
//! mzML stores numerical arrays (m/z, intensity) as Base64-encoded binary data,
//! optionally compressed with zlib. This module handles the decoding pipeline:
//!
//! 1. Base64 decode the text
//! 2. Decompress if needed (zlib)
//! 3. Interpret bytes per the numeric format (little-endian)

use std::io::Read;

use base64::prelude::*;
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::ZlibDecoder;

use crate::controlled_vocabulary::{NumericFormat, SourceCompression};

/// Errors that can occur during binary decoding
#[derive(Debug, thiserror::Error)]
pub enum BinaryDecodeError {
    /// The `<binary>` text is not valid Base64
    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    /// zlib stream could not be inflated
    #[error("Decompression error: {0}")]
    DecompressionError(#[from] std::io::Error),

    /// Decoded byte count does not fit the numeric format
    #[error("Invalid data length: {actual} bytes is not a multiple of {element_size}")]
    InvalidLength {
        /// Bytes per element
        element_size: usize,
        /// Decoded byte count
        actual: usize,
    },
}

/// Decoder for mzML binary data arrays
pub struct BinaryDecoder;

impl BinaryDecoder {
    /// Decode the Base64 text of one `<binary>` element
    pub fn decode(
        base64_text: &[u8],
        format: NumericFormat,
        compression: SourceCompression,
    ) -> Result<Vec<f64>, BinaryDecodeError> {
        let text: Vec<u8> = base64_text
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let decoded_bytes = BASE64_STANDARD.decode(&text)?;

        let uncompressed = match compression {
            SourceCompression::None => decoded_bytes,
            SourceCompression::Zlib => {
                let mut decoder = ZlibDecoder::new(&decoded_bytes[..]);
                let mut uncompressed = Vec::new();
                decoder.read_to_end(&mut uncompressed)?;
                uncompressed
            }
        };

        Self::bytes_to_values(&uncompressed, format)
    }

    /// Interpret raw little-endian bytes per the numeric format
    pub fn bytes_to_values(
        bytes: &[u8],
        format: NumericFormat,
    ) -> Result<Vec<f64>, BinaryDecodeError> {
        let element_size = format.element_size();
        if bytes.len() % element_size != 0 {
            return Err(BinaryDecodeError::InvalidLength {
                element_size,
                actual: bytes.len(),
            });
        }

        let count = bytes.len() / element_size;
        let mut values = Vec::with_capacity(count);
        let mut cursor = std::io::Cursor::new(bytes);

        match format {
            NumericFormat::Float32 => {
                for _ in 0..count {
                    values.push(cursor.read_f32::<LittleEndian>()? as f64);
                }
            }
            NumericFormat::Float64 => {
                for _ in 0..count {
                    values.push(cursor.read_f64::<LittleEndian>()?);
                }
            }
            NumericFormat::Int32 => {
                for _ in 0..count {
                    values.push(cursor.read_i32::<LittleEndian>()? as f64);
                }
            }
            NumericFormat::Int64 => {
                for _ in 0..count {
                    values.push(cursor.read_i64::<LittleEndian>()? as f64);
                }
            }
            NumericFormat::Encoded16 => {
                for _ in 0..count {
                    values.push(half_to_f64(cursor.read_u16::<LittleEndian>()?));
                }
            }
        }

        Ok(values)
    }
}

/// IEEE 754 binary16 to f64
fn half_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exponent = ((bits >> 10) & 0x1f) as i32;
    let fraction = (bits & 0x03ff) as f64;
    match exponent {
        0 => sign * fraction * 2f64.powi(-24),
        0x1f if fraction == 0.0 => sign * f64::INFINITY,
        0x1f => f64::NAN,
        _ => sign * (1.0 + fraction / 1024.0) * 2f64.powi(exponent - 15),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_decode_float64_uncompressed() {
        // 100.0 = 0x4059000000000000, 200.0 = 0x4069000000000000
        let bytes: [u8; 16] = [
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x59, 0x40, // 100.0
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x69, 0x40, // 200.0
        ];
        let text = BASE64_STANDARD.encode(bytes);

        let result =
            BinaryDecoder::decode(text.as_bytes(), NumericFormat::Float64, SourceCompression::None)
                .unwrap();
        assert_eq!(result, vec![100.0, 200.0]);
    }

    #[test]
    fn test_decode_float32_zlib() {
        let raw: Vec<u8> = [100.0f32, 200.0, 300.5]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        let text = BASE64_STANDARD.encode(encoder.finish().unwrap());

        let result =
            BinaryDecoder::decode(text.as_bytes(), NumericFormat::Float32, SourceCompression::Zlib)
                .unwrap();
        assert_eq!(result, vec![100.0, 200.0, 300.5]);
    }

    #[test]
    fn test_integer_formats() {
        let raw: Vec<u8> = [7i32, -3].iter().flat_map(|v| v.to_le_bytes()).collect();
        assert_eq!(
            BinaryDecoder::bytes_to_values(&raw, NumericFormat::Int32).unwrap(),
            vec![7.0, -3.0]
        );
        let raw: Vec<u8> = 1i64.to_le_bytes().to_vec();
        assert_eq!(
            BinaryDecoder::bytes_to_values(&raw, NumericFormat::Int64).unwrap(),
            vec![1.0]
        );
    }

    #[test]
    fn test_half_precision() {
        // 1.0 = 0x3C00, -2.0 = 0xC000, 0.5 = 0x3800
        let raw = [0x00, 0x3C, 0x00, 0xC0, 0x00, 0x38];
        assert_eq!(
            BinaryDecoder::bytes_to_values(&raw, NumericFormat::Encoded16).unwrap(),
            vec![1.0, -2.0, 0.5]
        );
        assert!(half_to_f64(0x7C00).is_infinite());
        assert!(half_to_f64(0x7E00).is_nan());
    }

    #[test]
    fn test_decode_empty_and_whitespace() {
        let result =
            BinaryDecoder::decode(b"  \n ", NumericFormat::Float64, SourceCompression::None)
                .unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_invalid_length() {
        let result = BinaryDecoder::bytes_to_values(&[0u8; 6], NumericFormat::Float32);
        assert!(matches!(
            result,
            Err(BinaryDecodeError::InvalidLength { element_size: 4, actual: 6 })
        ));
    }
}
