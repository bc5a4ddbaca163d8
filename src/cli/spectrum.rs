use anyhow::{Context, Result};
use std::path::PathBuf;

use mszsession::session::SessionRegistry;

/// Decode and print one spectrum
pub async fn run_spectrum(
    registry: &SessionRegistry,
    file: PathBuf,
    index: usize,
    json: bool,
) -> Result<()> {
    let session = registry
        .open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let result = session.spectrum(index).await;
    registry.close_all().await;
    let spectrum = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&spectrum)?);
        return Ok(());
    }

    println!(
        "Spectrum {} (scan {}, MS{}, RT {:.2} s)",
        spectrum.index, spectrum.scan, spectrum.ms_level, spectrum.retention_time
    );
    println!(
        "  Peaks: {}  TIC: {:.4e}",
        spectrum.peak_count(),
        spectrum.total_ion_current()
    );
    for (mz, intensity) in spectrum.mz.iter().zip(&spectrum.intensity) {
        println!("  {:>14.6} {:>14.2}", mz, intensity);
    }
    Ok(())
}

/// Print the ordinals of every spectrum at `level`
pub async fn run_levels(registry: &SessionRegistry, file: PathBuf, level: u32) -> Result<()> {
    let session = registry
        .open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let result = session.filter_by_ms_level(level).await;
    registry.close_all().await;

    let ordinals = result?;
    let line: Vec<String> = ordinals.iter().map(|i| i.to_string()).collect();
    println!("{}", line.join(" "));
    log::info!("{} spectra at MS level {}", ordinals.len(), level);
    Ok(())
}

/// Print the MS1 total ion current chromatogram
pub async fn run_tic(registry: &SessionRegistry, file: PathBuf, json: bool) -> Result<()> {
    let session = registry
        .open(&file)
        .await
        .with_context(|| format!("Failed to open {}", file.display()))?;
    let result = session.tic_table().await;
    registry.close_all().await;
    let table = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&table.chromatogram())?);
        return Ok(());
    }
    println!("{:>12} {:>16}", "rt_seconds", "tic");
    for (rt, tic) in table.chromatogram() {
        println!("{:>12.3} {:>16.4e}", rt, tic);
    }
    Ok(())
}
