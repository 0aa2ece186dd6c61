//! Pulling recipe changes
//!
//! `update` pulls the repository with git and rebuilds every package whose
//! recipe the pull touched. Packages that were installed stay installed.

use std::path::Path;

use tracing::{info, warn};

use crate::config::defaults;
use crate::core::builder::Builder;
use crate::error::{BuildError, UpdateError};
use crate::infra::git;

/// Label used for git failures that are not tied to one package
const REPOSITORY: &str = "repository";

/// Result of an update
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Packages whose recipe changed and still exists
    pub changed: Vec<String>,
    /// Recipes deleted upstream
    pub removed: Vec<String>,
    /// Packages rebuilt successfully
    pub rebuilt: Vec<String>,
    /// Packages whose rebuild failed
    pub failed: Vec<(String, BuildError)>,
}

impl UpdateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Names of recipes among `files`, which are relative to `root`
///
/// Only `<name>.json` files directly inside `recipes` count. The result is
/// sorted and free of duplicates.
pub fn recipe_names(root: &Path, recipes: &Path, files: &[String]) -> Vec<String> {
    let mut names: Vec<String> = files
        .iter()
        .map(|file| root.join(file))
        .filter(|path| path.parent() == Some(recipes))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(defaults::RECIPE_EXTENSION))
        .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Pull the repository and rebuild the packages whose recipes changed
pub async fn update_repository(builder: &Builder) -> Result<UpdateReport, UpdateError> {
    let config = builder.config();
    let root = config.root.as_path();

    let previous = git::head(REPOSITORY, root).await.map_err(UpdateError::Git)?;
    git::pull(REPOSITORY, root).await.map_err(UpdateError::Git)?;
    let files = git::changed_files(REPOSITORY, root, &previous)
        .await
        .map_err(UpdateError::Git)?;

    let mut report = UpdateReport::default();
    for name in recipe_names(root, &config.dirs.recipes, &files) {
        if builder.recipes().path(&name).exists() {
            report.changed.push(name);
        } else {
            warn!("Recipe of '{name}' was removed, not rebuilding it");
            report.removed.push(name);
        }
    }
    info!("{} recipes changed", report.changed.len());

    for name in report.changed.clone() {
        match builder.rebuild(&name).await {
            Ok(()) => report.rebuilt.push(name),
            Err(e) if e.is_fatal() => {
                return Err(UpdateError::Rebuild {
                    package: name,
                    source: e,
                })
            }
            Err(e) => {
                warn!("{name}: rebuild failed: {e}");
                report.failed.push((name, e));
            }
        }
    }

    Ok(report)
}
