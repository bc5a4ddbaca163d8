use std::path::Path;
use std::time::Duration;

use super::*;

fn sh(script: &str) -> JobSpec {
    JobSpec::new("sh").arg("-c").arg(script)
}

#[tokio::test]
async fn test_three_streams_are_separated() {
    let runner = ConversionJobRunner::default();
    let script = "echo 'PROGRESS: 10%' >&2; printf 'aGVsbG8='; \
                  echo 'warning: low intensity' >&2; echo 'PROGRESS: 100%' >&2";
    let mut handle = runner.start(sh(script)).unwrap();

    let mut progress = Vec::new();
    while let Some(line) = handle.next_progress().await {
        progress.push(line);
    }
    assert_eq!(progress, vec!["10%", "100%"]);
    assert_eq!(handle.next_diagnostic().await.as_deref(), Some("warning: low intensity"));

    let job = handle.finish().await.unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.exit_status, 0);
    assert_eq!(job.result_text(), "aGVsbG8=");
    assert_eq!(job.diagnostics, "warning: low intensity\n");
    assert!(job.succeeded());
    assert!(job.finished_at >= job.started_at);
}

#[tokio::test]
async fn test_failure_still_delivers_payload_and_status() {
    let runner = ConversionJobRunner::default();
    let handle = runner
        .start(sh("printf partial; echo 'Traceback: boom' >&2; exit 3"))
        .unwrap();
    let job = handle.finish().await.unwrap();
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.exit_status, 3);
    assert_eq!(job.result_text(), "partial");
    assert!(job.diagnostics.contains("boom"));
    assert!(!job.succeeded());
}

#[tokio::test]
async fn test_empty_payload_is_not_success() {
    let runner = ConversionJobRunner::default();
    let job = runner.start(sh("true")).unwrap().finish().await.unwrap();
    assert_eq!(job.exit_status, 0);
    assert!(!job.succeeded());
}

#[tokio::test]
async fn test_spawn_failure() {
    let runner = ConversionJobRunner::default();
    let err = runner
        .start(JobSpec::new("/nonexistent/analysis-tool"))
        .err()
        .unwrap();
    assert!(matches!(err, JobError::Spawn { .. }));
    assert_eq!(runner.running_count(), 0);
}

#[tokio::test]
async fn test_cancel_kills_process() {
    let runner = ConversionJobRunner::default();
    let handle = runner.start(sh("sleep 30")).unwrap();
    assert_eq!(handle.state(), JobState::Running);
    handle.cancel();
    let err = tokio::time::timeout(Duration::from_secs(5), handle.finish())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, JobError::Cancelled));
}

#[tokio::test]
async fn test_timeout_kills_process() {
    let runner = ConversionJobRunner::new(JobConfig {
        timeout: Some(Duration::from_millis(100)),
        ..JobConfig::default()
    });
    let handle = runner.start(sh("sleep 30")).unwrap();
    let state = handle.subscribe_state();
    let err = handle.finish().await.unwrap_err();
    assert!(matches!(err, JobError::TimedOut(_)));
    assert_eq!(*state.borrow(), JobState::Failed);
}

#[tokio::test]
async fn test_retriggered_jobs_run_independently() {
    let runner = ConversionJobRunner::default();
    let path = Path::new("/data/run01.mzML");
    let first = runner
        .start(JobSpec::new("sh").arg("-c").arg("sleep 0.2; printf one").subject(path))
        .unwrap();
    let second = runner
        .start(JobSpec::new("sh").arg("-c").arg("sleep 0.2; printf two").subject(path))
        .unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(runner.running_for(path), 2);
    assert_eq!(runner.running_for(Path::new("/data/other.mzML")), 0);

    let (a, b) = tokio::join!(first.finish(), second.finish());
    assert_eq!(a.unwrap().result_text(), "one");
    assert_eq!(b.unwrap().result_text(), "two");
    assert_eq!(runner.running_for(path), 0);
}

#[tokio::test]
async fn test_custom_progress_prefix() {
    let runner = ConversionJobRunner::new(JobConfig {
        progress_prefix: "@@".to_string(),
        ..JobConfig::default()
    });
    let mut handle = runner
        .start(sh("echo '@@ reading spectra' >&2; echo 'PROGRESS: not progress' >&2"))
        .unwrap();
    assert_eq!(handle.next_progress().await.as_deref(), Some("reading spectra"));
    let job = handle.finish().await.unwrap();
    assert_eq!(job.diagnostics, "PROGRESS: not progress\n");
}

#[tokio::test]
async fn test_streams_drain_together() {
    let runner = ConversionJobRunner::default();
    let mut handle = runner
        .start(sh("echo 'PROGRESS: half' >&2; echo 'note' >&2; printf done"))
        .unwrap();

    let (progress, diagnostics) = handle.streams();
    let mut seen_progress = Vec::new();
    while let Some(line) = progress.recv().await {
        seen_progress.push(line);
    }
    assert_eq!(seen_progress, vec!["half"]);
    assert_eq!(diagnostics.recv().await.as_deref(), Some("note"));

    let job = handle.finish().await.unwrap();
    assert_eq!(job.result_text(), "done");
}
