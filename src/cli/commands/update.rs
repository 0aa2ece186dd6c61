//! CLI implementation for `strapkit update`

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use super::{lock_repository, open_repository};
use crate::cli::output::{is_json, print_detail, print_info, print_json, print_success, print_warning, status};
use crate::core::builder::Builder;
use crate::core::update::{update_repository, UpdateReport};

/// Execute the update command
pub async fn execute(root: &Path) -> Result<()> {
    let config = open_repository(root)?;
    let _lock = lock_repository(root).await?;
    let builder = Builder::new(Arc::new(config));

    print_info("Updating packages");
    let report = update_repository(&builder)
        .await
        .context("Update aborted")?;

    summarize(&report);

    if !report.is_success() {
        bail!("{} package(s) failed to rebuild", report.failed.len());
    }
    Ok(())
}

fn summarize(report: &UpdateReport) {
    if is_json() {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(name, error)| serde_json::json!({ "name": name, "error": error.to_string() }))
            .collect();
        print_json(&serde_json::json!({
            "status": if report.is_success() { "success" } else { "error" },
            "changed": report.changed,
            "removed": report.removed,
            "rebuilt": report.rebuilt,
            "failed": failed,
        }));
        return;
    }

    for name in &report.removed {
        print_warning(&format!("Recipe of '{name}' was removed upstream"));
    }

    if report.changed.is_empty() {
        print_success("No recipes changed");
        return;
    }

    for name in &report.rebuilt {
        print_detail(&format!("{} {name}", status::SUCCESS));
    }
    for (name, error) in &report.failed {
        eprintln!("{} {name}: {}", status::ERROR, error.root_cause());
    }
    if report.is_success() {
        print_success(&format!("Rebuilt {} packages", report.rebuilt.len()));
    }
}
