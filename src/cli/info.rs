use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use mszsession::engine::FileType;
use mszsession::session::{FileSession, MsLevelSummary, SessionRegistry};

/// Per-file summary printed by `info`
#[derive(Debug, Serialize)]
struct FileReport {
    path: PathBuf,
    file_type: String,
    size: Option<u64>,
    spectra: Option<u64>,
    levels: Option<MsLevelSummary>,
    mz_format: Option<String>,
    intensity_format: Option<String>,
    compression: Option<String>,
    error: Option<String>,
}

impl FileReport {
    fn failed(path: PathBuf, error: String) -> Self {
        Self {
            path,
            file_type: FileType::Unknown.label().to_string(),
            size: None,
            spectra: None,
            levels: None,
            mz_format: None,
            intensity_format: None,
            compression: None,
            error: Some(error),
        }
    }

    async fn from_session(session: &FileSession) -> Self {
        let file_type = session.file_type().unwrap_or(FileType::Unknown);
        let mut report = Self {
            path: session.path().to_path_buf(),
            file_type: file_type.label().to_string(),
            size: session.size(),
            spectra: None,
            levels: None,
            mz_format: None,
            intensity_format: None,
            compression: None,
            error: None,
        };
        if file_type != FileType::SourceXml {
            return report;
        }

        match session.metadata().await {
            Ok(metadata) => {
                report.spectra = Some(metadata.source_total_spec);
                report.mz_format = Some(metadata.source_mz_fmt.to_string());
                report.intensity_format = Some(metadata.source_inten_fmt.to_string());
                report.compression = Some(metadata.source_compression.to_string());
            }
            Err(e) => report.error = Some(e.to_string()),
        }
        if report.error.is_none() {
            match session.ms_level_summary().await {
                Ok(levels) => report.levels = Some(levels),
                Err(e) => report.error = Some(e.to_string()),
            }
        }
        report
    }
}

/// Display information about one or more files
pub async fn run(registry: &SessionRegistry, files: Vec<PathBuf>, json: bool) -> Result<()> {
    let mut reports = Vec::new();
    for (path, opened) in registry.open_many(files).await {
        let report = match opened {
            Ok(session) => FileReport::from_session(&session).await,
            Err(e) => FileReport::failed(path, e.to_string()),
        };
        reports.push(report);
    }
    registry.close_all().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        println!("{}", report.path.display());
        println!("  Type: {}", styled_label(&report.file_type));
        if let Some(size) = report.size {
            println!(
                "  Size: {} bytes ({:.2} MB)",
                size,
                size as f64 / 1024.0 / 1024.0
            );
        }
        if let Some(spectra) = report.spectra {
            println!("  Spectra: {}", spectra);
        }
        if let Some(levels) = report.levels {
            println!(
                "  MS levels: {} MS1, {} MS2, {} MSn",
                levels.ms1, levels.ms2, levels.msn
            );
        }
        if let (Some(mz), Some(inten), Some(comp)) =
            (&report.mz_format, &report.intensity_format, &report.compression)
        {
            println!("  Encoding: m/z {}, intensity {}, {}", mz, inten, comp);
        }
        if let Some(error) = &report.error {
            println!("  Error: {}", error);
        }
        println!();
    }
    Ok(())
}

/// Show engine identifier and thread count
pub async fn run_engine(registry: &SessionRegistry) -> Result<()> {
    let cancel = CancellationToken::new();
    let version = registry.rpc().codec_version(&cancel).await?;
    let threads = registry.rpc().thread_count(&cancel).await?;
    println!("Engine: {}", version);
    println!("Threads: {}", threads);
    Ok(())
}

#[cfg(feature = "colorized_output")]
fn styled_label(label: &str) -> String {
    use console::style;

    match label {
        "mzML" => style(label).green().to_string(),
        "msz" => style(label).cyan().to_string(),
        "external" => style(label).yellow().to_string(),
        _ => style(label).red().to_string(),
    }
}

#[cfg(not(feature = "colorized_output"))]
fn styled_label(label: &str) -> String {
    label.to_string()
}
