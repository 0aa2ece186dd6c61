//! CLI implementation for `strapkit clean` command
//!
//! Removes install prefixes, sources, bootstrap output and build records.

use std::path::Path;

use anyhow::{Context, Result};

use super::{load_config, lock_repository};
use crate::cli::output::{confirm, is_json, print_detail, print_json, print_success};
use crate::core::clean::{clean_repository, has_build_artifacts};

/// Execute the clean command
pub async fn execute(root: &Path, yes: bool) -> Result<()> {
    let config = load_config(root)?;

    // Check if there's anything to clean
    if !has_build_artifacts(&config) {
        if is_json() {
            print_json(&serde_json::json!({ "status": "success", "removed": [] }));
        } else {
            print_success("Nothing to clean");
        }
        return Ok(());
    }

    confirm("Remove everything built in this repository?", yes)?;

    let _lock = lock_repository(root).await?;
    let result = clean_repository(&config).context("Failed to clean the repository")?;

    if is_json() {
        print_json(&serde_json::json!({ "status": "success", "removed": result.removed }));
        return Ok(());
    }

    print_success("Cleaned repository:");
    for dir in &result.removed {
        print_detail(&format!("Removed {}/", dir.display()));
    }
    print_detail("Run 'strapkit setup-env' before building again.");

    Ok(())
}
