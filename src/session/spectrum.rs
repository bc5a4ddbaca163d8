use serde::Serialize;

/// One measurement record assembled from the position index and two decodes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    /// Spectrum ordinal
    pub index: usize,
    /// Scan number
    pub scan: i64,
    /// Retention time in seconds
    pub retention_time: f64,
    /// MS level
    pub ms_level: u32,
    /// Decoded m/z array
    pub mz: Vec<f64>,
    /// Decoded intensity array
    pub intensity: Vec<f64>,
}

impl Spectrum {
    /// Sum of intensities
    pub fn total_ion_current(&self) -> f64 {
        self.intensity.iter().sum()
    }

    /// Number of peaks
    pub fn peak_count(&self) -> usize {
        self.mz.len()
    }
}

/// One MS1 spectrum in a TIC table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicEntry {
    /// Spectrum ordinal
    pub index: usize,
    /// Retention time in seconds
    pub retention_time: f64,
    /// Decoded m/z array
    pub mz: Vec<f64>,
    /// Decoded intensity array
    pub intensity: Vec<f64>,
    /// Sum of intensities
    pub total_ion_current: f64,
}

/// Every MS1 spectrum of a file, in index order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TicTable {
    /// MS1 spectra
    pub entries: Vec<TicEntry>,
}

impl TicTable {
    /// (retention time, TIC) pairs
    pub fn chromatogram(&self) -> Vec<(f64, f64)> {
        self.entries
            .iter()
            .map(|entry| (entry.retention_time, entry.total_ion_current))
            .collect()
    }
}

impl From<Spectrum> for TicEntry {
    fn from(spectrum: Spectrum) -> Self {
        let total_ion_current = spectrum.total_ion_current();
        Self {
            index: spectrum.index,
            retention_time: spectrum.retention_time,
            mz: spectrum.mz,
            intensity: spectrum.intensity,
            total_ion_current,
        }
    }
}

/// Spectrum counts per MS level; level 3 and above collapse into `msn`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MsLevelSummary {
    /// Level 1 spectra
    pub ms1: usize,
    /// Level 2 spectra
    pub ms2: usize,
    /// Level 3+ spectra
    pub msn: usize,
}

impl MsLevelSummary {
    /// Count levels
    pub fn from_levels(levels: &[u32]) -> Self {
        let mut summary = Self::default();
        for &level in levels {
            match level {
                1 => summary.ms1 += 1,
                2 => summary.ms2 += 1,
                l if l >= 3 => summary.msn += 1,
                _ => {}
            }
        }
        summary
    }

    /// Total counted spectra
    pub fn total(&self) -> usize {
        self.ms1 + self.ms2 + self.msn
    }
}
