use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::conversion::{CompressionConfig, ConfigError};

/// Command line and subject of one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Program to run
    pub program: OsString,
    /// Arguments, in order
    pub args: Vec<OsString>,
    /// File the job works on, used for per-path bookkeeping
    pub subject: Option<PathBuf>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Extra environment variables
    pub env: Vec<(OsString, OsString)>,
}

impl JobSpec {
    /// A job running `program` with no arguments
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            subject: None,
            working_dir: None,
            env: Vec::new(),
        }
    }

    /// Analysis job: `program args... path`.
    ///
    /// The program writes its result payload to stdout, progress lines to
    /// stderr with the runner's progress prefix, and anything else to stderr
    /// as diagnostics.
    pub fn analysis<I, S>(program: impl Into<OsString>, args: I, path: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::new(program)
            .args(args)
            .arg(path.as_os_str())
            .subject(path)
    }

    /// `mscompress` invocation converting `input` into `output`
    pub fn mscompress(
        program: impl Into<OsString>,
        input: &Path,
        output: &Path,
        config: &CompressionConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(program)
            .args(config.mscompress_args()?)
            .arg(input.as_os_str())
            .arg(output.as_os_str())
            .subject(input))
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the subject path
    pub fn subject(mut self, path: impl Into<PathBuf>) -> Self {
        self.subject = Some(path.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Program name for logs
    pub fn display_program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}
