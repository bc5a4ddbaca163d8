use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

use mszsession::conversion::CompressionConfig;
use mszsession::engine::FileType;
use mszsession::job::{ConversionJobRunner, JobSpec};
use mszsession::session::{naming, SessionRegistry};

use super::Config;

fn output_dir_for(output_dir: &Option<PathBuf>, input: &Path) -> PathBuf {
    match output_dir {
        Some(dir) => dir.clone(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

/// Convert every file through the engine, one after another
pub async fn run(
    registry: &SessionRegistry,
    files: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    config: &CompressionConfig,
) -> Result<()> {
    info!(
        "Converting {} file(s), mode {}, {} threads",
        files.len(),
        config
            .mode()
            .map(|mode| mode.to_string())
            .unwrap_or_else(|| "custom".to_string()),
        config.thread_count
    );

    let mut failures = 0usize;
    for (path, opened) in registry.open_many(files).await {
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                failures += 1;
                continue;
            }
        };
        let directory = output_dir_for(&output_dir, &path);
        let converted = match session.output_path(&directory) {
            Ok(output) => session.convert(&output, config).await,
            Err(e) => Err(e),
        };
        match converted {
            Ok(output) => {
                let size = std::fs::metadata(&output).map(|m| m.len()).unwrap_or(0);
                println!(
                    "{} -> {} ({:.2} MB)",
                    path.display(),
                    output.display(),
                    size as f64 / 1024.0 / 1024.0
                );
            }
            Err(e) => {
                warn!("{}: {}", path.display(), e);
                failures += 1;
            }
        }
    }
    registry.close_all().await;

    if failures > 0 {
        anyhow::bail!("{} file(s) failed to convert", failures);
    }
    Ok(())
}

/// Run mscompress directly as tracked jobs, streaming its progress
pub async fn run_jobs(
    settings: &Config,
    files: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    config: &CompressionConfig,
) -> Result<()> {
    let runner = ConversionJobRunner::new(settings.job_config());
    let program = settings.engine_config().mscompress_program;

    let mut failures = 0usize;
    for input in files {
        let file_type = guess_type(&input);
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(output_name) = naming::output_file_name(&name, file_type) else {
            warn!("{}: cannot derive an output name", input.display());
            failures += 1;
            continue;
        };
        let output = output_dir_for(&output_dir, &input).join(output_name);

        let spec = JobSpec::mscompress(program.as_os_str(), &input, &output, config)?;
        let mut handle = runner
            .start(spec)
            .with_context(|| format!("Failed to start mscompress for {}", input.display()))?;
        while let Some(line) = handle.next_progress().await {
            eprintln!("{}: {}", input.display(), line);
        }
        let job = handle.finish().await?;
        if job.exit_status == 0 {
            println!("{} -> {}", input.display(), output.display());
        } else {
            warn!(
                "{}: mscompress exited with status {}\n{}",
                input.display(),
                job.exit_status,
                job.diagnostics.trim_end()
            );
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} file(s) failed to convert", failures);
    }
    Ok(())
}

/// Extension-based type guess for files that are not opened in a session
fn guess_type(path: &Path) -> FileType {
    match path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("mzml") => FileType::SourceXml,
        Some("msz") => FileType::CompressedBinary,
        Some("raw") => FileType::ExternalConvertible,
        _ => FileType::Unknown,
    }
}
