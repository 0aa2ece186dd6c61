//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod build_all;
pub mod chroot;
pub mod clean;
pub mod doctor;
pub mod list;
pub mod setup;
pub mod unlock;
pub mod update;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::core::config::Config;
use crate::infra::lock::RepoLock;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the working directories of the repository
    SetupEnv,

    /// Build a package and its dependencies without installing it
    Build {
        /// Package name
        package: String,
    },

    /// Build and install a package and its dependencies
    Install {
        /// Package name
        package: String,
    },

    /// Discard a package's progress and build it again from its sources
    Rebuild {
        /// Package name
        package: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Build and install packages concurrently (every recipe if none given)
    BuildAll {
        /// Packages to build
        packages: Vec<String>,

        /// Number of packages built at the same time
        #[arg(short, long)]
        jobs: Option<usize>,
    },

    /// Run a package's run commands, installing it first if needed
    Run {
        /// Package name
        package: String,
    },

    /// Remove everything built in this repository
    Clean {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Pull the repository and rebuild packages whose recipes changed
    Update,

    /// Run a command with the install prefix as its root directory
    Chroot {
        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// List known packages and their build state
    List,

    /// Check system dependencies and the repository layout
    Doctor,

    /// Remove the lock left behind by a crashed strapkit
    ForceUnlock,
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        let current_dir = repository_root()?;
        match self {
            Self::SetupEnv => setup::execute(&current_dir).await,
            Self::Build { package } => build::execute(&current_dir, &package, build::Action::Build).await,
            Self::Install { package } => {
                build::execute(&current_dir, &package, build::Action::Install).await
            }
            Self::Rebuild { package, yes } => {
                build::execute(&current_dir, &package, build::Action::Rebuild { yes }).await
            }
            Self::Run { package } => build::execute(&current_dir, &package, build::Action::Run).await,
            Self::BuildAll { packages, jobs } => build_all::execute(&current_dir, &packages, jobs).await,
            Self::Clean { yes } => clean::execute(&current_dir, yes).await,
            Self::Update => update::execute(&current_dir).await,
            Self::Chroot { command } => chroot::execute(&current_dir, &command),
            Self::List => list::execute(&current_dir).await,
            Self::Doctor => doctor::execute(&current_dir).await,
            Self::ForceUnlock => unlock::execute(&current_dir).await,
        }
    }
}

/// The repository is the directory strapkit is started in
fn repository_root() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to determine the current directory")
}

/// Load the repository configuration
pub(crate) fn load_config(root: &Path) -> Result<Config> {
    Config::load(root).with_context(|| format!("Failed to load configuration in {}", root.display()))
}

/// Load the configuration of a repository that has been set up
pub(crate) fn open_repository(root: &Path) -> Result<Config> {
    let config = load_config(root)?;
    config.ensure_layout()?;
    Ok(config)
}

/// Take the repository lock for a mutating command
pub(crate) async fn lock_repository(root: &Path) -> Result<RepoLock> {
    let lock = RepoLock::acquire(root)
        .await
        .context("Failed to lock the repository")?;
    lock.release_on_signal();
    Ok(lock)
}
