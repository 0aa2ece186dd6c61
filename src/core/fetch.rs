//! Source acquisition
//!
//! Brings a package's sources into `<repos>/<name>`: downloads and extracts
//! archives, clones git repositories, then applies the recipe's patches in
//! order.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::defaults;
use crate::core::config::Config;
use crate::core::package::{PackageDescriptor, Source};
use crate::error::FetchError;
use crate::infra::download::DownloadManager;
use crate::infra::process::run_tool;
use crate::infra::{filesystem, git};

/// Fetches package sources into the repos directory
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    repos: PathBuf,
    downloads: DownloadManager,
}

impl SourceFetcher {
    pub fn new(config: &Config) -> Self {
        Self::with_downloader(config, DownloadManager::new())
    }

    pub fn with_downloader(config: &Config, downloads: DownloadManager) -> Self {
        Self {
            repos: config.dirs.repos.clone(),
            downloads,
        }
    }

    /// Source directory of a package
    pub fn source_dir(&self, name: &str) -> PathBuf {
        self.repos.join(name)
    }

    fn archive_path(&self, pkg: &PackageDescriptor, url: &str) -> PathBuf {
        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .filter(|f| !f.is_empty())
            .map_or_else(|| format!("{}.tar", pkg.name), |f| format!("{}-{f}", pkg.name));
        self.repos.join(defaults::DOWNLOADS_SUBDIR).join(file_name)
    }

    /// Fetch the sources of `pkg` and apply its patches
    pub async fn fetch(&self, pkg: &PackageDescriptor) -> Result<PathBuf, FetchError> {
        let dir = self.source_dir(&pkg.name);

        match &pkg.source {
            Source::Sourceless => {
                filesystem::create_dir_all(&dir)?;
            }
            Source::WebArchive { url, sha256 } => {
                info!("{}: downloading {}", pkg.name, url);
                let archive = self.archive_path(pkg, url);
                self.downloads
                    .fetch(url, &archive, sha256.as_deref())
                    .await
                    .map_err(|source| FetchError::Download {
                        package: pkg.name.clone(),
                        source,
                    })?;

                filesystem::recreate_dir(&dir)?;
                extract(&pkg.name, &archive, &dir).await?;
            }
            Source::VersionControl { url, reference } => {
                info!("{}: cloning {} at {}", pkg.name, url, reference);
                git::clone(&pkg.name, url, &dir).await?;
                git::checkout(&pkg.name, &dir, reference).await?;
            }
        }

        for patch in &pkg.patches {
            info!("{}: patching {}", pkg.name, patch.target.display());
            if patch.delete_before {
                filesystem::remove_file(&dir.join(&patch.target))?;
            }
            let target = patch.target.to_string_lossy();
            let patch_file = patch.patch.to_string_lossy();
            run_tool(&pkg.name, "patch", &["-u", &target, "-i", &patch_file], Some(&dir)).await?;
        }

        Ok(dir)
    }
}

/// Extract an archive, dropping its top-level directory
async fn extract(package: &str, archive: &Path, dest: &Path) -> Result<(), FetchError> {
    let archive = archive.to_string_lossy();
    let dest = dest.to_string_lossy();
    run_tool(
        package,
        "tar",
        &["-xf", &archive, "-C", &dest, "--strip-components=1"],
        None,
    )
    .await
}
