//! Compression configuration sent alongside prepare/compress/decompress.

use serde::{Deserialize, Serialize};

use crate::controlled_vocabulary::{Accession, AccessionTag};

use super::error::ConfigError;
use super::mode::CompressionMode;

/// Target formats and codec tuning for a conversion
///
/// Serializes as
/// `{thread_count, target_xml_format, target_mz_format, target_inten_format, zstd_compression_level}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Worker threads the engine may use (>= 1)
    #[serde(alias = "threads")]
    pub thread_count: usize,
    /// Target directive for the xml stream
    pub target_xml_format: Accession,
    /// Target directive for the m/z stream
    pub target_mz_format: Accession,
    /// Target directive for the intensity stream
    pub target_inten_format: Accession,
    /// zstd level used by ZSTD directives
    pub zstd_compression_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_mode(CompressionMode::Default, threads)
    }
}

impl CompressionConfig {
    /// Build a configuration from a preset
    pub fn with_mode(mode: CompressionMode, thread_count: usize) -> Self {
        let mut config = Self {
            thread_count,
            target_xml_format: Accession::Known(AccessionTag::ZstdCompression),
            target_mz_format: Accession::Known(AccessionTag::ZstdCompression),
            target_inten_format: Accession::Known(AccessionTag::ZstdCompression),
            zstd_compression_level: 3,
        };
        config.set_mode(mode);
        config
    }

    /// Apply a preset, overwriting the three target formats and the zstd level.
    ///
    /// The thread count is left untouched.
    pub fn set_mode(&mut self, mode: CompressionMode) {
        let target = Accession::Known(mode.target_format());
        self.target_xml_format = target.clone();
        self.target_mz_format = target.clone();
        self.target_inten_format = target;
        self.zstd_compression_level = mode.zstd_level();
    }

    /// The preset this configuration matches exactly, if any
    pub fn mode(&self) -> Option<CompressionMode> {
        [
            CompressionMode::Fastest,
            CompressionMode::Faster,
            CompressionMode::Default,
            CompressionMode::Better,
        ]
        .into_iter()
        .find(|mode| Self::with_mode(*mode, self.thread_count) == *self)
    }

    /// Builder-style thread count override
    pub fn threads(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    fn targets(&self) -> [(&'static str, &Accession); 3] {
        [
            ("target_xml_format", &self.target_xml_format),
            ("target_mz_format", &self.target_mz_format),
            ("target_inten_format", &self.target_inten_format),
        ]
    }

    /// Check the configuration before it reaches the engine.
    ///
    /// Every target field must hold a recognized compression or transform
    /// directive; unrecognized accessions are rejected here rather than
    /// passed through.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thread_count == 0 {
            return Err(ConfigError::InvalidThreadCount(self.thread_count));
        }
        for (field, value) in self.targets() {
            match value.tag() {
                Some(tag) if tag.is_target_directive() => {}
                _ => {
                    return Err(ConfigError::UnsupportedTarget {
                        field,
                        value: value.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Render the configuration as `mscompress` command-line flags.
    ///
    /// Codec directives map to `--target-*-format`; lossy transforms on the
    /// m/z and intensity streams map to `--mz-lossy`/`--int-lossy` and are
    /// stored with zstd.
    pub fn mscompress_args(&self) -> Result<Vec<String>, ConfigError> {
        self.validate()?;
        let mut args = vec!["-t".to_string(), self.thread_count.to_string()];
        let mut lossy = Vec::new();

        for (field, value) in self.targets() {
            let tag = match value.tag() {
                Some(tag) => tag,
                None => {
                    return Err(ConfigError::UnsupportedTarget {
                        field,
                        value: value.clone(),
                    })
                }
            };
            let flag = match field {
                "target_xml_format" => "--target-xml-format",
                "target_mz_format" => "--target-mz-format",
                _ => "--target-inten-format",
            };
            let codec = match codec_name(tag) {
                Some(codec) => codec,
                None => {
                    let lossy_flag = match field {
                        "target_mz_format" => "--mz-lossy",
                        "target_inten_format" => "--int-lossy",
                        _ => {
                            return Err(ConfigError::NotRenderable {
                                field,
                                value: value.clone(),
                            })
                        }
                    };
                    let name = lossy_name(tag).ok_or_else(|| ConfigError::NotRenderable {
                        field,
                        value: value.clone(),
                    })?;
                    lossy.push(lossy_flag.to_string());
                    lossy.push(name.to_string());
                    "zstd"
                }
            };
            args.push(flag.to_string());
            args.push(codec.to_string());
        }

        args.extend(lossy);
        args.push("--zstd-compression-level".to_string());
        args.push(self.zstd_compression_level.to_string());
        Ok(args)
    }
}

fn codec_name(tag: AccessionTag) -> Option<&'static str> {
    match tag {
        AccessionTag::ZstdCompression | AccessionTag::Lossless => Some("zstd"),
        AccessionTag::Lz4Compression => Some("lz4"),
        AccessionTag::NoCompression => Some("none"),
        _ => None,
    }
}

fn lossy_name(tag: AccessionTag) -> Option<&'static str> {
    match tag {
        AccessionTag::Cast64To32 => Some("cast"),
        AccessionTag::Cast64To16 => Some("cast16"),
        AccessionTag::Log2Transform => Some("log"),
        AccessionTag::Delta16Transform => Some("delta16"),
        AccessionTag::Delta24Transform => Some("delta24"),
        AccessionTag::Delta32Transform => Some("delta32"),
        AccessionTag::VDelta16Transform => Some("vdelta16"),
        AccessionTag::VDelta24Transform => Some("vdelta24"),
        AccessionTag::Vbr => Some("vbr"),
        AccessionTag::Bitpack => Some("bitpack"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controlled_vocabulary::RawAccession;
    use serde_json::json;

    fn targets_json(config: &CompressionConfig) -> serde_json::Value {
        let mut value = serde_json::to_value(config).unwrap();
        value.as_object_mut().unwrap().remove("thread_count");
        value
    }

    #[test]
    fn test_presets_exact() {
        let mut config = CompressionConfig::with_mode(CompressionMode::Default, 4);
        config.set_mode(CompressionMode::Fastest);
        assert_eq!(
            targets_json(&config),
            json!({
                "target_xml_format": "_LZ4_compression_",
                "target_mz_format": "_LZ4_compression_",
                "target_inten_format": "_LZ4_compression_",
                "zstd_compression_level": 1
            })
        );

        for (mode, level) in [
            (CompressionMode::Faster, 1),
            (CompressionMode::Default, 3),
            (CompressionMode::Better, 6),
        ] {
            config.set_mode(mode);
            assert_eq!(
                targets_json(&config),
                json!({
                    "target_xml_format": "_ZSTD_compression_",
                    "target_mz_format": "_ZSTD_compression_",
                    "target_inten_format": "_ZSTD_compression_",
                    "zstd_compression_level": level
                })
            );
            assert_eq!(config.thread_count, 4);
            assert_eq!(config.mode(), Some(mode));
        }
    }

    #[test]
    fn test_threads_alias() {
        let config: CompressionConfig = serde_json::from_value(json!({
            "threads": 8,
            "target_xml_format": "_ZSTD_compression_",
            "target_mz_format": 4700004,
            "target_inten_format": "_ZSTD_compression_",
            "zstd_compression_level": 3
        }))
        .unwrap();
        assert_eq!(config.thread_count, 8);
        assert_eq!(config.target_mz_format.tag(), Some(AccessionTag::Delta16Transform));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unrecognized_target() {
        let mut config = CompressionConfig::with_mode(CompressionMode::Default, 2);
        config.target_mz_format = Accession::Unrecognized(RawAccession::Number(4799999));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedTarget { field: "target_mz_format", .. })
        ));

        let mut config = CompressionConfig::with_mode(CompressionMode::Default, 2);
        config.target_xml_format = Accession::Known(AccessionTag::Float32);
        assert!(config.validate().is_err());

        let config = CompressionConfig::with_mode(CompressionMode::Default, 0);
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreadCount(0)));
    }

    #[test]
    fn test_mscompress_args() {
        let config = CompressionConfig::with_mode(CompressionMode::Better, 6);
        assert_eq!(
            config.mscompress_args().unwrap(),
            vec![
                "-t", "6",
                "--target-xml-format", "zstd",
                "--target-mz-format", "zstd",
                "--target-inten-format", "zstd",
                "--zstd-compression-level", "6",
            ]
        );

        let mut config = CompressionConfig::with_mode(CompressionMode::Fastest, 1);
        config.target_mz_format = AccessionTag::Delta24Transform.into();
        config.target_inten_format = AccessionTag::NoCompression.into();
        let args = config.mscompress_args().unwrap();
        assert_eq!(&args[2..4], ["--target-xml-format", "lz4"]);
        assert_eq!(&args[4..6], ["--target-mz-format", "zstd"]);
        assert_eq!(&args[6..8], ["--target-inten-format", "none"]);
        assert_eq!(&args[8..10], ["--mz-lossy", "delta24"]);
    }

    #[test]
    fn test_xml_transform_not_renderable() {
        let mut config = CompressionConfig::with_mode(CompressionMode::Default, 1);
        config.target_xml_format = AccessionTag::Vbr.into();
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.mscompress_args(),
            Err(ConfigError::NotRenderable { field: "target_xml_format", .. })
        ));
    }
}
