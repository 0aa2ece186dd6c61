//! CLI implementation for `strapkit force-unlock`

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::output::{is_json, print_json, print_success, print_warning};
use crate::infra::lock::{force_unlock, holder, is_locked};

/// Execute the force-unlock command
pub async fn execute(root: &Path) -> Result<()> {
    let pid = holder(root);
    let live = is_locked(root).context("Failed to inspect the repository lock")?;
    let removed = force_unlock(root).context("Failed to remove the repository lock")?;

    if is_json() {
        print_json(&serde_json::json!({ "status": "success", "removed": removed, "holder": pid, "held": live }));
        return Ok(());
    }

    if removed {
        if live {
            let pid = pid.map_or_else(|| "another process".to_string(), |pid| format!("process {pid}"));
            print_warning(&format!(
                "Removed lock held by {pid}, which is still running. The repository may be damaged"
            ));
        }
        print_success("Repository unlocked");
    } else {
        print_success("Repository was not locked");
    }
    Ok(())
}
