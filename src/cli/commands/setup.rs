//! CLI implementation for `strapkit setup-env`

use std::path::Path;

use anyhow::{Context, Result};

use super::{load_config, lock_repository};
use crate::cli::output::{is_json, print_detail, print_json, print_success, print_warning};
use crate::core::setup::setup_environment;

/// Execute the setup-env command
pub async fn execute(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    let _lock = lock_repository(root).await?;

    let result = setup_environment(&config).context("Failed to set up the repository")?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "created": result.created,
            "existing": result.existing,
        }));
        return Ok(());
    }

    if result.created.is_empty() {
        print_success("Repository is already set up");
    } else {
        print_success("Set up repository:");
        for dir in &result.created {
            print_detail(&format!("Created {}/", dir.display()));
        }
    }

    if !config.dirs.recipes.is_dir() {
        print_warning(&format!(
            "No recipes directory at {}. Add package recipes there before building.",
            config.dirs.recipes.display()
        ));
    }

    Ok(())
}
