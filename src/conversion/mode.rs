//! Compression presets.
//!
//! A mode pins all three target formats and the zstd level at once, hiding
//! the individual directives from end users.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::controlled_vocabulary::AccessionTag;

use super::error::ConfigError;

/// Compression presets for common use cases.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// LZ4 on every stream, zstd level 1
    Fastest,

    /// ZSTD level 1
    Faster,

    /// ZSTD level 3
    #[default]
    Default,

    /// ZSTD level 6
    Better,
}

impl CompressionMode {
    /// Target directive applied to the xml, m/z and intensity streams.
    pub fn target_format(&self) -> AccessionTag {
        match self {
            CompressionMode::Fastest => AccessionTag::Lz4Compression,
            CompressionMode::Faster | CompressionMode::Default | CompressionMode::Better => {
                AccessionTag::ZstdCompression
            }
        }
    }

    /// Returns the zstd compression level for this mode.
    pub fn zstd_level(&self) -> i32 {
        match self {
            CompressionMode::Fastest | CompressionMode::Faster => 1,
            CompressionMode::Default => 3,
            CompressionMode::Better => 6,
        }
    }

    /// Returns all available mode names.
    pub fn variants() -> &'static [&'static str] {
        &["fastest", "faster", "default", "better"]
    }
}

impl fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMode::Fastest => write!(f, "fastest"),
            CompressionMode::Faster => write!(f, "faster"),
            CompressionMode::Default => write!(f, "default"),
            CompressionMode::Better => write!(f, "better"),
        }
    }
}

impl FromStr for CompressionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fastest" => Ok(CompressionMode::Fastest),
            "faster" => Ok(CompressionMode::Faster),
            "default" => Ok(CompressionMode::Default),
            "better" => Ok(CompressionMode::Better),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_defaults() {
        let mode = CompressionMode::default();
        assert_eq!(mode, CompressionMode::Default);
        assert_eq!(mode.zstd_level(), 3);
        assert_eq!(mode.target_format(), AccessionTag::ZstdCompression);
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!(CompressionMode::from_str("fastest").unwrap(), CompressionMode::Fastest);
        assert_eq!(CompressionMode::from_str("BETTER").unwrap(), CompressionMode::Better);
        for name in CompressionMode::variants() {
            let mode = CompressionMode::from_str(name).unwrap();
            assert_eq!(mode.to_string(), *name);
        }
        assert!(matches!(
            CompressionMode::from_str("slowest"),
            Err(ConfigError::UnknownMode(_))
        ));
    }
}
