//! Output file naming for conversions.

use std::path::{Path, PathBuf};

use crate::engine::FileType;

/// Output file name for converting `filename` of the given type.
///
/// - mzML: the last extension becomes `.msz`
/// - msz: `.msz` is stripped when the name has more than one dot
///   (`run.mzML.msz` -> `run.mzML`), otherwise it becomes `.mzML`
/// - external: `.msz` is appended
pub fn output_file_name(filename: &str, file_type: FileType) -> Option<String> {
    match file_type {
        FileType::SourceXml => Some(match filename.rfind('.') {
            Some(dot) if dot + 1 < filename.len() => format!("{}.msz", &filename[..dot]),
            _ => filename.to_string(),
        }),
        FileType::CompressedBinary => {
            if filename.matches('.').count() > 1 {
                Some(filename.replacen(".msz", "", 1))
            } else {
                Some(filename.replacen(".msz", ".mzML", 1))
            }
        }
        FileType::ExternalConvertible => Some(format!("{}.msz", filename)),
        FileType::Unknown => None,
    }
}

/// Output path inside `directory` for converting `input`
pub fn output_path(directory: &Path, input: &Path, file_type: FileType) -> Option<PathBuf> {
    let filename = input.file_name()?.to_string_lossy();
    output_file_name(&filename, file_type).map(|name| directory.join(name))
}
