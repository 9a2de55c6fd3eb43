use crate::config::AppConfig;
use crate::error::AppError;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerates candidate image files under the configured scan root.
///
/// Entries are visited sorted by file name at every level, so the scan order
/// (and therefore the output document) is stable across runs. A missing root
/// is the one fatal error of the whole pipeline; unreadable entries deeper in
/// the tree are skipped with a warning.
pub fn collect_files(config: &AppConfig) -> Result<Vec<PathBuf>, AppError> {
    let root = Path::new(&config.scan_directory);
    if !root.is_dir() {
        return Err(AppError::ScanRootMissing(config.scan_directory.clone()));
    }

    log::info!("Starting file discovery in {}", config.scan_directory);
    log::debug!(
        "Configured allowed extensions: {:?}",
        config.allowed_extensions
    );

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        match path.extension().and_then(|s| s.to_str()) {
            Some(ext) if config.allowed_extensions.contains(&ext.to_lowercase()) => {
                log::debug!("Discovered image file: {:?}", path);
                files.push(path.to_path_buf());
            }
            _ => log::trace!("Skipping file with unsupported extension: {:?}", path),
        }
    }

    log::info!("File discovery complete, {} candidate file(s).", files.len());
    Ok(files)
}
