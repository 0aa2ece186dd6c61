//! Repository configuration
//!
//! Settings are read once at startup from `strapkit.toml` at the repository
//! root (all keys optional), then overridden from the environment and the
//! command line. The resulting [`Config`] is passed by reference to the graph
//! builder, the build state machine and the stage runner.
//!
//! Environment variables:
//! - `STRAPKIT_TARGET_TRIPLET` - Override the target triplet
//! - `STRAPKIT_HOST_TRIPLET` - Override the host triplet
//! - `STRAPKIT_JOBS` - Override the number of concurrent package builds

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::error::ConfigError;

/// Contents of `strapkit.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigFile {
    /// Triplet packages are cross compiled for
    pub target_triplet: Option<String>,

    /// Triplet of the machine running the build
    pub host_triplet: Option<String>,

    /// Number of packages built concurrently by `build-all`
    pub jobs: Option<usize>,

    /// Directory layout overrides
    #[serde(default)]
    pub directories: DirectoriesFile,
}

/// `[directories]` table of `strapkit.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct DirectoriesFile {
    pub prefix: Option<PathBuf>,
    pub host_prefix: Option<PathBuf>,
    pub bootstrap: Option<PathBuf>,
    pub repos: Option<PathBuf>,
    pub recipes: Option<PathBuf>,
    pub pkginfo: Option<PathBuf>,
    pub binary_packages: Option<PathBuf>,
}

impl ConfigFile {
    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_toml(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }
}

/// Resolved, absolute directory layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    /// Final install directory
    pub prefix: PathBuf,
    /// Final install directory for host packages
    pub host_prefix: PathBuf,
    /// Output of bootstrap commands, as well as built binaries
    pub bootstrap: PathBuf,
    /// Fetched sources
    pub repos: PathBuf,
    /// Recipes
    pub recipes: PathBuf,
    /// Build records
    pub pkginfo: PathBuf,
    /// Binary packages
    pub binary_packages: PathBuf,
}

impl Directories {
    fn resolve(root: &Path, file: &DirectoriesFile) -> Self {
        let pick = |configured: &Option<PathBuf>, default: &str| {
            let path = configured
                .clone()
                .unwrap_or_else(|| PathBuf::from(default));
            if path.is_absolute() {
                path
            } else {
                root.join(path)
            }
        };

        Self {
            prefix: pick(&file.prefix, defaults::PREFIX_DIR),
            host_prefix: pick(&file.host_prefix, defaults::HOST_PREFIX_DIR),
            bootstrap: pick(&file.bootstrap, defaults::BOOTSTRAP_DIR),
            repos: pick(&file.repos, defaults::REPO_DIR),
            recipes: pick(&file.recipes, defaults::RECIPES_DIR),
            pkginfo: pick(&file.pkginfo, defaults::PKGINFO_DIR),
            binary_packages: pick(&file.binary_packages, defaults::BINARY_PACKAGE_DIR),
        }
    }

    /// Directories created by `setup-env` and removed by `clean`
    pub fn working_dirs(&self) -> [&Path; 5] {
        [
            &self.prefix,
            &self.host_prefix,
            &self.bootstrap,
            &self.repos,
            &self.pkginfo,
        ]
    }
}

/// Configuration of one strapkit invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Repository root (the working directory at start)
    pub root: PathBuf,
    pub dirs: Directories,
    pub target_triplet: String,
    pub host_triplet: String,
    /// Concurrent package builds in `build-all`
    pub jobs: usize,
}

impl Config {
    /// Load the configuration of the repository rooted at `root`
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let file = ConfigFile::load(&root.join(defaults::CONFIG_FILE))?;
        Self::from_file(root, &file)
    }

    /// Resolve a parsed config file, applying environment overrides
    pub fn from_file(root: &Path, file: &ConfigFile) -> Result<Self, ConfigError> {
        let host_triplet = env::var(defaults::ENV_HOST_TRIPLET)
            .ok()
            .or_else(|| file.host_triplet.clone())
            .unwrap_or_else(default_host_triplet);

        let target_triplet = env::var(defaults::ENV_TARGET_TRIPLET)
            .ok()
            .or_else(|| file.target_triplet.clone())
            .unwrap_or_else(|| host_triplet.clone());

        let jobs = match env::var(defaults::ENV_JOBS) {
            Ok(value) => parse_jobs(&value)?,
            Err(_) => file.jobs.unwrap_or_else(num_cpus::get),
        };

        for (key, value) in [("host-triplet", &host_triplet), ("target-triplet", &target_triplet)] {
            if value.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.clone(),
                });
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            dirs: Directories::resolve(root, &file.directories),
            target_triplet,
            host_triplet,
            jobs: jobs.max(1),
        })
    }

    /// Default layout under `root` with explicit triplets, ignoring the environment
    pub fn for_root(root: impl Into<PathBuf>, host_triplet: &str, target_triplet: &str) -> Self {
        let root = root.into();
        Self {
            dirs: Directories::resolve(&root, &DirectoriesFile::default()),
            root,
            target_triplet: target_triplet.to_string(),
            host_triplet: host_triplet.to_string(),
            jobs: num_cpus::get(),
        }
    }

    /// Override the number of concurrent builds
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Whether packages are built for a different machine than this one
    pub fn cross_compiling(&self) -> bool {
        self.host_triplet != self.target_triplet
    }

    /// Check that `setup-env` has been run
    pub fn ensure_layout(&self) -> Result<(), ConfigError> {
        if !self.dirs.recipes.is_dir() {
            return Err(ConfigError::MissingRecipes {
                path: self.dirs.recipes.clone(),
            });
        }

        for dir in self.dirs.working_dirs() {
            if !dir.is_dir() {
                return Err(ConfigError::MissingDirectory {
                    path: dir.to_path_buf(),
                });
            }
        }

        Ok(())
    }
}

/// Triplet this binary was compiled for
pub fn default_host_triplet() -> String {
    option_env!("VERGEN_CARGO_TARGET_TRIPLE")
        .map(str::to_string)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("{}-unknown-{}", env::consts::ARCH, env::consts::OS))
}

fn parse_jobs(value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|jobs| *jobs > 0)
        .ok_or_else(|| ConfigError::InvalidValue {
            key: defaults::ENV_JOBS.to_string(),
            value: value.to_string(),
        })
}
