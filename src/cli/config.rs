//! TOML configuration file support.
//!
//! Settings that would otherwise need many flags can live in a config file:
//!
//! ```toml
//! # mszsession.toml
//! [engine]
//! mscompress = "/opt/mscompress/bin/mscompress"
//! blocksize = 50000000
//! workers = 4
//! call_timeout_secs = 30
//!
//! [conversion]
//! mode = "better"
//! threads = 8
//! output_directory = "converted"
//!
//! [analysis]
//! program = "python3"
//! args = ["mzml_to_tic.py"]
//! timeout_secs = 600
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mszsession::conversion::{CompressionConfig, CompressionMode};
use mszsession::engine::mzml::MzMLEngineConfig;
use mszsession::job::{JobConfig, DEFAULT_PROGRESS_PREFIX};
use mszsession::rpc::RpcConfig;

/// Root configuration structure for mszsession.toml files.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Engine and channel settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Conversion defaults.
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Analysis job settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Configuration for the engine and the RPC channel.
#[derive(Debug, Default, Deserialize)]
pub struct EngineConfig {
    /// Path to the mscompress program.
    pub mscompress: Option<PathBuf>,

    /// Division size for compression, in bytes.
    pub blocksize: Option<u64>,

    /// Engine worker threads.
    pub workers: Option<usize>,

    /// Timeout for ordinary calls, in seconds.
    pub call_timeout_secs: Option<u64>,

    /// Timeout for compress/decompress calls, in seconds.
    pub conversion_timeout_secs: Option<u64>,
}

/// Configuration for the convert command.
#[derive(Debug, Default, Deserialize)]
pub struct ConversionConfig {
    /// Compression mode (fastest, faster, default, better).
    pub mode: Option<String>,

    /// Compression threads.
    pub threads: Option<usize>,

    /// ZSTD level, overriding the mode's level.
    pub zstd_level: Option<i32>,

    /// Default output directory when `-o` is not given.
    pub output_directory: Option<PathBuf>,
}

/// Configuration for the analyze command.
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisConfig {
    /// Program to run.
    pub program: Option<PathBuf>,

    /// Arguments placed before the file path.
    #[serde(default)]
    pub args: Vec<String>,

    /// stderr prefix marking progress lines.
    pub progress_prefix: Option<String>,

    /// Kill the job after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Engine settings with defaults filled in.
    pub fn engine_config(&self) -> MzMLEngineConfig {
        let defaults = MzMLEngineConfig::default();
        MzMLEngineConfig {
            mscompress_program: self
                .engine
                .mscompress
                .clone()
                .unwrap_or(defaults.mscompress_program),
            blocksize: self.engine.blocksize.unwrap_or(defaults.blocksize),
        }
    }

    /// Channel settings with defaults filled in.
    pub fn rpc_config(&self) -> RpcConfig {
        let mut config = RpcConfig::default();
        if let Some(workers) = self.engine.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.engine.call_timeout_secs {
            config = config.with_call_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.engine.conversion_timeout_secs {
            config = config.with_conversion_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Compression settings; command-line values win over the file.
    pub fn compression_config(
        &self,
        mode: Option<CompressionMode>,
        threads: Option<usize>,
    ) -> Result<CompressionConfig> {
        let mode = match (mode, &self.conversion.mode) {
            (Some(mode), _) => mode,
            (None, Some(name)) => name.parse()?,
            (None, None) => CompressionMode::default(),
        };
        let threads = threads
            .or(self.conversion.threads)
            .unwrap_or_else(|| CompressionConfig::default().thread_count);

        let mut config = CompressionConfig::with_mode(mode, threads);
        if let Some(level) = self.conversion.zstd_level {
            config.zstd_compression_level = level;
        }
        config.validate()?;
        Ok(config)
    }

    /// Analysis job settings with defaults filled in.
    pub fn job_config(&self) -> JobConfig {
        JobConfig {
            progress_prefix: self
                .analysis
                .progress_prefix
                .clone()
                .unwrap_or_else(|| DEFAULT_PROGRESS_PREFIX.to_string()),
            timeout: self.analysis.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [engine]
            mscompress = "/opt/mscompress"
            blocksize = 5000
            workers = 2
            call_timeout_secs = 30

            [conversion]
            mode = "better"
            threads = 8
            output_directory = "/data/out"

            [analysis]
            program = "python3"
            args = ["mzml_to_tic.py"]
            timeout_secs = 600
        "#;

        let config = Config::from_str(toml).unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.mscompress_program, PathBuf::from("/opt/mscompress"));
        assert_eq!(engine.blocksize, 5000);

        let rpc = config.rpc_config();
        assert_eq!(rpc.worker_threads, 2);
        assert_eq!(rpc.call_timeout, Duration::from_secs(30));

        let compression = config.compression_config(None, None).unwrap();
        assert_eq!(compression.mode(), Some(CompressionMode::Better));
        assert_eq!(compression.thread_count, 8);
        assert_eq!(
            config.conversion.output_directory,
            Some(PathBuf::from("/data/out"))
        );

        assert_eq!(config.analysis.args, vec!["mzml_to_tic.py"]);
        assert_eq!(config.job_config().timeout, Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_flags_override_file() {
        let config = Config::from_str("[conversion]\nmode = \"better\"\nthreads = 8\n").unwrap();
        let compression = config
            .compression_config(Some(CompressionMode::Fastest), Some(2))
            .unwrap();
        assert_eq!(compression.mode(), Some(CompressionMode::Fastest));
        assert_eq!(compression.thread_count, 2);
    }

    #[test]
    fn test_invalid_mode_in_file() {
        let config = Config::from_str("[conversion]\nmode = \"ultra\"\n").unwrap();
        assert!(config.compression_config(None, None).is_err());
    }

    #[test]
    fn test_empty_config() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.engine.blocksize, None);
        assert_eq!(config.job_config().progress_prefix, DEFAULT_PROGRESS_PREFIX);
        assert!(config.compression_config(None, Some(0)).is_err());
    }
}
