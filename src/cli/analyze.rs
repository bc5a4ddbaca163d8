use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;

use mszsession::job::{ConversionJobRunner, JobSpec};

use super::Config;

const DEFAULT_ANALYSIS_PROGRAM: &str = "python3";
const DEFAULT_ANALYSIS_SCRIPT: &str = "mzml_to_tic.py";

/// Run the analysis program on `file` and emit its payload
pub async fn run(settings: &Config, file: PathBuf, output: Option<PathBuf>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let (program, args) = match &settings.analysis.program {
        Some(program) => (program.clone(), settings.analysis.args.clone()),
        None => (
            PathBuf::from(DEFAULT_ANALYSIS_PROGRAM),
            vec![DEFAULT_ANALYSIS_SCRIPT.to_string()],
        ),
    };

    let runner = ConversionJobRunner::new(settings.job_config());
    let mut handle = runner
        .start(JobSpec::analysis(program.as_os_str(), args, &file))
        .context("Failed to start analysis")?;
    info!("analysis job {} started for {}", handle.id(), file.display());

    // Diagnostics arrive on their own channel; drain them alongside progress.
    let (progress, diagnostics) = handle.streams();
    let mut progress_open = true;
    let mut diagnostics_open = true;
    while progress_open || diagnostics_open {
        tokio::select! {
            line = progress.recv(), if progress_open => match line {
                Some(line) => eprintln!("[{}] {}", file.display(), line),
                None => progress_open = false,
            },
            line = diagnostics.recv(), if diagnostics_open => match line {
                Some(line) => warn!("analysis: {}", line),
                None => diagnostics_open = false,
            },
        }
    }

    let job = handle.finish().await?;
    info!(
        "analysis of {} finished with status {} in {} ms",
        file.display(),
        job.exit_status,
        job.elapsed().num_milliseconds()
    );

    match output {
        Some(path) => std::fs::write(&path, &job.accumulated_result)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", job.result_text()),
    }

    if !job.succeeded() {
        anyhow::bail!(
            "analysis failed with status {}{}",
            job.exit_status,
            if job.accumulated_result.is_empty() {
                " and produced no result"
            } else {
                ""
            }
        );
    }
    Ok(())
}
