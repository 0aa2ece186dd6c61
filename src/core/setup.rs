//! Repository setup
//!
//! Creates the working directories a repository needs before anything can be
//! built, plus a notice in the build record directory.

use std::path::PathBuf;

use crate::config::defaults;
use crate::core::config::Config;
use crate::error::FilesystemError;
use crate::infra::filesystem;

/// Result of setting up a repository
#[derive(Debug, Default)]
pub struct SetupResult {
    /// Directories that were created
    pub created: Vec<PathBuf>,
    /// Directories that already existed
    pub existing: Vec<PathBuf>,
}

/// Create every working directory that does not exist yet
pub fn setup_environment(config: &Config) -> Result<SetupResult, FilesystemError> {
    let mut result = SetupResult::default();

    for dir in config.dirs.working_dirs() {
        if dir.is_dir() {
            result.existing.push(dir.to_path_buf());
        } else {
            filesystem::create_dir_all(dir)?;
            result.created.push(dir.to_path_buf());
        }
    }

    let readme = config.dirs.pkginfo.join("README");
    if !readme.exists() {
        filesystem::write_file(&readme, defaults::PKGINFO_README)?;
    }

    Ok(result)
}
