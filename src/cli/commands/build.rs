//! Single-package commands: `build`, `install`, `rebuild` and `run`
//!
//! Each advances one package (and, recursively, its dependencies) through
//! the builder while holding the repository lock.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::{lock_repository, open_repository};
use crate::cli::output::{confirm, is_json, print_json, print_success};
use crate::core::builder::Builder;
use crate::core::record::BuildState;

/// What to do with the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Build,
    Install,
    Rebuild { yes: bool },
    Run,
}

impl Action {
    fn verb(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Install => "install",
            Self::Rebuild { .. } => "rebuild",
            Self::Run => "run",
        }
    }
}

/// Execute a single-package command
pub async fn execute(root: &Path, package: &str, action: Action) -> Result<()> {
    let config = open_repository(root)?;

    if let Action::Rebuild { yes } = action {
        confirm(&format!("Discard all progress of '{package}' and build it again?"), yes)?;
    }

    let _lock = lock_repository(root).await?;
    let builder = Builder::new(Arc::new(config));

    info!("Running '{}' for {}", action.verb(), package);
    let outcome = match action {
        Action::Build => builder.advance(package, false, true).await,
        Action::Install => builder.advance(package, true, true).await,
        Action::Rebuild { .. } => builder.rebuild(package).await,
        Action::Run => builder.run(package).await,
    };
    outcome.with_context(|| format!("Failed to {} '{}'", action.verb(), package))?;

    let state = builder
        .records()
        .read_unvalidated(package)?
        .map_or(BuildState::Clean, |record| record.state);

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "package": package,
            "action": action.verb(),
            "state": state.as_str(),
        }));
    } else {
        print_success(&format!("{package} is {state}"));
    }

    Ok(())
}
