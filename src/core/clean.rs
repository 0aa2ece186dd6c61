//! Clean logic
//!
//! Removes everything a build produced: install prefixes, fetched sources,
//! bootstrap output and build records. Recipes and binary packages stay.

use std::path::PathBuf;

use crate::core::config::Config;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of clean operation
#[derive(Debug, Default)]
pub struct CleanResult {
    /// Directories that were removed
    pub removed: Vec<PathBuf>,
    /// Directories that didn't exist (skipped)
    pub skipped: Vec<PathBuf>,
}

/// Remove all working directories of the repository
pub fn clean_repository(config: &Config) -> Result<CleanResult, FilesystemError> {
    let mut result = CleanResult::default();

    for dir in config.dirs.working_dirs() {
        if dir.exists() {
            filesystem::remove_dir_all(dir)?;
            result.removed.push(dir.to_path_buf());
        } else {
            result.skipped.push(dir.to_path_buf());
        }
    }

    Ok(result)
}

/// Check if the repository has anything to clean
pub fn has_build_artifacts(config: &Config) -> bool {
    config.dirs.working_dirs().iter().any(|dir| dir.exists())
}
