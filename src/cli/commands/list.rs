//! CLI implementation for `strapkit list`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::load_config;
use crate::cli::output::{is_json, print_info, print_json};
use crate::core::recipe::RecipeBook;
use crate::core::record::{BuildState, RecordStore};

/// One line of the listing
struct Entry {
    name: String,
    version: String,
    state: String,
    description: String,
}

/// Execute the list command
pub async fn execute(root: &Path) -> Result<()> {
    let config = Arc::new(load_config(root)?);
    let records = RecordStore::from_config(&config);
    let recipes = RecipeBook::new(Arc::clone(&config));

    let names = recipes.names().context("Failed to list recipes")?;
    let entries: Vec<Entry> = names
        .into_iter()
        .map(|name| {
            let (version, description) = match recipes.load(&name) {
                Ok(pkg) => (pkg.version.to_string(), pkg.description.clone()),
                Err(e) => ("?".to_string(), e.to_string()),
            };
            let state = match records.read_unvalidated(&name) {
                Ok(record) => record.map_or(BuildState::Clean, |r| r.state).to_string(),
                Err(_) => "corrupt".to_string(),
            };
            Entry {
                name,
                version,
                state,
                description,
            }
        })
        .collect();

    if is_json() {
        let packages: Vec<_> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "name": e.name,
                    "version": e.version,
                    "state": e.state,
                    "description": e.description,
                })
            })
            .collect();
        print_json(&serde_json::json!({ "packages": packages }));
        return Ok(());
    }

    if entries.is_empty() {
        print_info(&format!("No recipes in {}", config.dirs.recipes.display()));
        return Ok(());
    }

    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    for entry in &entries {
        println!(
            "{:<width$}  {:<9}  {:<10}  {}",
            entry.name, entry.version, entry.state, entry.description
        );
    }

    Ok(())
}
