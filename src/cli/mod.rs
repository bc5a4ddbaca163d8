use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use mszsession::conversion::CompressionMode;
use mszsession::engine::mzml::MzMLEngine;
use mszsession::rpc::RpcChannel;
use mszsession::session::SessionRegistry;

mod analyze;
mod config;
mod convert;
mod info;
mod spectrum;

pub use config::Config;

/// mszsession - inspect, convert and analyze mzML/msz files
#[derive(Parser)]
#[command(name = "mszsession")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Load settings from a TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Compression mode for the convert command.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// LZ4 everywhere
    Fastest,
    /// ZSTD level 1
    Faster,
    /// ZSTD level 3
    Default,
    /// ZSTD level 6
    Better,
}

impl From<ModeArg> for CompressionMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Fastest => CompressionMode::Fastest,
            ModeArg::Faster => CompressionMode::Faster,
            ModeArg::Default => CompressionMode::Default,
            ModeArg::Better => CompressionMode::Better,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show type, size and spectrum counts of one or more files
    Info {
        /// Input files
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Decode one spectrum
    Spectrum {
        /// Input mzML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Spectrum ordinal (0-based)
        #[arg(value_name = "INDEX")]
        index: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List spectrum ordinals at an MS level
    Levels {
        /// Input mzML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// MS level to select
        #[arg(value_name = "LEVEL")]
        level: u32,
    },

    /// Print the total ion current table
    Tic {
        /// Input mzML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Compress mzML files to msz, or decompress msz files to mzML
    Convert {
        /// Input files
        #[arg(value_name = "FILES", required = true)]
        files: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short = 'o', long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Compression mode
        #[arg(short = 'm', long, value_enum)]
        mode: Option<ModeArg>,

        /// Compression threads
        #[arg(short = 't', long)]
        threads: Option<usize>,

        /// Run mscompress as a tracked job with streamed progress
        #[arg(long)]
        job: bool,
    },

    /// Run the analysis program on a file
    Analyze {
        /// Input file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the result payload here instead of stdout
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Show engine version and thread count
    Engine,
}

impl Cli {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

pub fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();
}

/// Start the engine and a registry over it
fn open_registry(config: &Config) -> Result<SessionRegistry> {
    let engine = MzMLEngine::new(config.engine_config());
    let channel = RpcChannel::spawn(Arc::new(engine), config.rpc_config())
        .context("Failed to start engine workers")?;
    Ok(SessionRegistry::new(channel))
}

pub fn dispatch(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("mszsession-rt")
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Commands::Info { files, json } => {
                let registry = open_registry(&config)?;
                info::run(&registry, files, json).await
            }
            Commands::Spectrum { file, index, json } => {
                let registry = open_registry(&config)?;
                spectrum::run_spectrum(&registry, file, index, json).await
            }
            Commands::Levels { file, level } => {
                let registry = open_registry(&config)?;
                spectrum::run_levels(&registry, file, level).await
            }
            Commands::Tic { file, json } => {
                let registry = open_registry(&config)?;
                spectrum::run_tic(&registry, file, json).await
            }
            Commands::Convert {
                files,
                output_dir,
                mode,
                threads,
                job,
            } => {
                let compression =
                    config.compression_config(mode.map(CompressionMode::from), threads)?;
                let output_dir =
                    output_dir.or_else(|| config.conversion.output_directory.clone());
                if job {
                    convert::run_jobs(&config, files, output_dir, &compression).await
                } else {
                    let registry = open_registry(&config)?;
                    convert::run(&registry, files, output_dir, &compression).await
                }
            }
            Commands::Analyze { file, output } => analyze::run(&config, file, output).await,
            Commands::Engine => {
                let registry = open_registry(&config)?;
                info::run_engine(&registry).await
            }
        }
    })
}
