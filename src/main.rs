//! # mszsession CLI
//!
//! Command-line front end over the session layer: inspect files, decode
//! spectra, convert between mzML and msz, and run analysis jobs.
//!
//! ## Usage
//!
//! ```bash
//! # Type, size and spectrum counts
//! mszsession info run01.mzML run02.msz
//!
//! # Decode spectrum 10
//! mszsession spectrum run01.mzML 10
//!
//! # Compress into out/ with the "better" preset
//! mszsession convert run01.mzML -o out -m better
//!
//! # Run the TIC analysis script
//! mszsession analyze run01.mzML -o tic.json
//! ```

use anyhow::Result;
use clap::Parser;

mod cli;

use cli::{dispatch, init_logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    dispatch(cli)
}
