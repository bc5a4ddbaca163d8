use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::JobError;
use super::spec::JobSpec;

/// Default marker for progress lines on stderr
pub const DEFAULT_PROGRESS_PREFIX: &str = "PROGRESS:";

/// Runner configuration
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// stderr lines starting with this prefix are progress, not diagnostics
    pub progress_prefix: String,
    /// Kill jobs that run longer than this
    pub timeout: Option<Duration>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            progress_prefix: DEFAULT_PROGRESS_PREFIX.to_string(),
            timeout: None,
        }
    }
}

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    /// Described by a [`JobSpec`] but not started.
    ///
    /// A [`JobHandle`] never reports this state: [`ConversionJobRunner::start`]
    /// returns only after the process has been spawned, so every handle
    /// starts out `Running`.
    Idle,
    /// Process running
    Running,
    /// Process exited with status 0
    Completed,
    /// Process exited non-zero, was killed, or could not be read
    Failed,
}

/// Outcome of a finished job
///
/// A non-zero `exit_status` with an empty or malformed `accumulated_result`
/// is the only failure signal the job's program gives.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    /// Job id
    pub id: Uuid,
    /// File the job worked on
    pub subject: Option<PathBuf>,
    /// Final state
    pub state: JobState,
    /// Everything the program wrote to stdout
    #[serde(skip)]
    pub accumulated_result: Bytes,
    /// Non-progress stderr text
    pub diagnostics: String,
    /// Exit status, -1 when terminated by a signal
    pub exit_status: i32,
    /// Process start time
    pub started_at: DateTime<Utc>,
    /// Process exit time
    pub finished_at: DateTime<Utc>,
}

impl ConversionJob {
    /// Whether the program exited cleanly and produced a payload
    pub fn succeeded(&self) -> bool {
        self.exit_status == 0 && !self.accumulated_result.is_empty()
    }

    /// Result payload as UTF-8 text, lossily
    pub fn result_text(&self) -> String {
        String::from_utf8_lossy(&self.accumulated_result).into_owned()
    }

    /// Wall-clock runtime
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// A running job: three output streams plus control.
///
/// Progress lines and diagnostics arrive while the process runs; the result
/// payload is delivered with the exit status by [`finish`](Self::finish).
pub struct JobHandle {
    id: Uuid,
    progress: mpsc::UnboundedReceiver<String>,
    diagnostics: mpsc::UnboundedReceiver<String>,
    state: watch::Receiver<JobState>,
    cancel: CancellationToken,
    task: JoinHandle<Result<ConversionJob, JobError>>,
}

impl JobHandle {
    /// Job id
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current state
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    /// Next progress line, `None` once the process has closed stderr
    pub async fn next_progress(&mut self) -> Option<String> {
        self.progress.recv().await
    }

    /// Next diagnostic line, `None` once the process has closed stderr
    pub async fn next_diagnostic(&mut self) -> Option<String> {
        self.diagnostics.recv().await
    }

    /// Progress and diagnostics receivers, for draining both at once
    pub fn streams(
        &mut self,
    ) -> (
        &mut mpsc::UnboundedReceiver<String>,
        &mut mpsc::UnboundedReceiver<String>,
    ) {
        (&mut self.progress, &mut self.diagnostics)
    }

    /// Kill the process; `finish` then fails with [`JobError::Cancelled`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the process to exit and collect its output.
    ///
    /// Resolves with the payload and exit status whether or not the status
    /// indicates failure.
    pub async fn finish(self) -> Result<ConversionJob, JobError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(JobError::Task(e.to_string())),
        }
    }
}

/// Starts analysis and conversion jobs as child processes.
///
/// Every [`start`](Self::start) launches a new process; concurrent requests
/// for the same path are not merged. [`running_for`](Self::running_for)
/// reports how many are live for a path.
pub struct ConversionJobRunner {
    config: JobConfig,
    running: Arc<DashMap<Uuid, Option<PathBuf>>>,
    cancel: CancellationToken,
}

/// Unregisters a job when its driving task ends, however it ends.
struct RunningGuard {
    running: Arc<DashMap<Uuid, Option<PathBuf>>>,
    id: Uuid,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.id);
    }
}

enum Outcome {
    Exited(std::io::Result<(Vec<u8>, String, std::process::ExitStatus)>),
    Cancelled,
    TimedOut(Duration),
}

impl ConversionJobRunner {
    /// Create a runner
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            running: Arc::new(DashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Runner configuration
    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// Spawn the job's process and start streaming its output.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, spec: JobSpec) -> Result<JobHandle, JobError> {
        let id = Uuid::new_v4();
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|source| JobError::Spawn {
            program: spec.display_program(),
            source,
        })?;
        info!(
            "job {} started: {} (pid {:?})",
            id,
            spec.display_program(),
            child.id()
        );

        self.running.insert(id, spec.subject.clone());
        let guard = RunningGuard {
            running: Arc::clone(&self.running),
            id,
        };

        let (progress_tx, progress) = mpsc::unbounded_channel();
        let (diagnostics_tx, diagnostics) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(JobState::Running);
        let cancel = self.cancel.child_token();

        let driver = Driver {
            id,
            subject: spec.subject,
            progress_prefix: self.config.progress_prefix.clone(),
            timeout: self.config.timeout,
            cancel: cancel.clone(),
            progress_tx,
            diagnostics_tx,
            state_tx,
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            driver.run(child).await
        });

        Ok(JobHandle {
            id,
            progress,
            diagnostics,
            state,
            cancel,
            task,
        })
    }

    /// Number of live jobs whose subject is `path`
    pub fn running_for(&self, path: &Path) -> usize {
        self.running
            .iter()
            .filter(|entry| entry.value().as_deref() == Some(path))
            .count()
    }

    /// Number of live jobs
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Cancel every live job
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }
}

impl Default for ConversionJobRunner {
    fn default() -> Self {
        Self::new(JobConfig::default())
    }
}

impl Drop for ConversionJobRunner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    id: Uuid,
    subject: Option<PathBuf>,
    progress_prefix: String,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    progress_tx: mpsc::UnboundedSender<String>,
    diagnostics_tx: mpsc::UnboundedSender<String>,
    state_tx: watch::Sender<JobState>,
}

impl Driver {
    async fn run(self, mut child: Child) -> Result<ConversionJob, JobError> {
        let started_at = Utc::now();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let outcome = {
            let collect = async {
                tokio::try_join!(
                    read_all(stdout),
                    self.split_stderr(stderr),
                    child.wait()
                )
            };
            let deadline = async {
                match self.timeout {
                    Some(timeout) => {
                        tokio::time::sleep(timeout).await;
                        timeout
                    }
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                exited = collect => Outcome::Exited(exited),
                _ = self.cancel.cancelled() => Outcome::Cancelled,
                after = deadline => Outcome::TimedOut(after),
            }
        };

        let (result, diagnostics, status) = match outcome {
            Outcome::Exited(Ok(collected)) => collected,
            Outcome::Exited(Err(e)) => {
                self.kill(&mut child).await;
                return Err(e.into());
            }
            Outcome::Cancelled => {
                info!("job {} cancelled", self.id);
                self.kill(&mut child).await;
                return Err(JobError::Cancelled);
            }
            Outcome::TimedOut(after) => {
                warn!("job {} timed out after {:?}", self.id, after);
                self.kill(&mut child).await;
                return Err(JobError::TimedOut(after));
            }
        };

        let exit_status = status.code().unwrap_or(-1);
        let state = if exit_status == 0 {
            info!("job {} exited with status 0", self.id);
            JobState::Completed
        } else {
            warn!("job {} exited with status {}", self.id, exit_status);
            JobState::Failed
        };
        self.state_tx.send_replace(state);

        Ok(ConversionJob {
            id: self.id,
            subject: self.subject.clone(),
            state,
            accumulated_result: Bytes::from(result),
            diagnostics,
            exit_status,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Route stderr lines: prefixed lines are progress, the rest diagnostics.
    async fn split_stderr<R>(&self, stderr: Option<R>) -> std::io::Result<String>
    where
        R: AsyncRead + Unpin,
    {
        let mut diagnostics = String::new();
        let Some(stderr) = stderr else {
            return Ok(diagnostics);
        };
        let mut lines = BufReader::new(stderr).lines();
        while let Some(line) = lines.next_line().await? {
            match line.strip_prefix(self.progress_prefix.as_str()) {
                Some(status) => {
                    debug!("job {} progress: {}", self.id, status.trim());
                    // The handle may have been dropped; keep draining regardless.
                    let _ = self.progress_tx.send(status.trim().to_string());
                }
                None => {
                    diagnostics.push_str(&line);
                    diagnostics.push('\n');
                    let _ = self.diagnostics_tx.send(line);
                }
            }
        }
        Ok(diagnostics)
    }

    async fn kill(&self, child: &mut Child) {
        if let Err(e) = child.kill().await {
            debug!("job {} kill failed: {}", self.id, e);
        }
        self.state_tx.send_replace(JobState::Failed);
    }
}

async fn read_all<R>(stream: Option<R>) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(mut stream) = stream {
        stream.read_to_end(&mut buffer).await?;
    }
    Ok(buffer)
}
