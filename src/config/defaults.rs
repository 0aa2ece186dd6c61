//! Default configuration values

/// Repository configuration file name
pub const CONFIG_FILE: &str = "strapkit.toml";

/// Repository lock file name
pub const LOCK_FILE: &str = ".strapkit.lock";

/// Final install directory
pub const PREFIX_DIR: &str = "pkgs";

/// Final install directory for host packages
pub const HOST_PREFIX_DIR: &str = "host_pkgs";

/// Output of bootstrap commands and built binaries
pub const BOOTSTRAP_DIR: &str = "bootstrap";

/// Fetched and cloned sources
pub const REPO_DIR: &str = "repos";

/// Package recipes
pub const RECIPES_DIR: &str = "recipes";

/// Persisted build records
pub const PKGINFO_DIR: &str = "pkginfo";

/// Binary packages
pub const BINARY_PACKAGE_DIR: &str = "bin_pkgs";

/// Downloaded archives, under the repo directory
pub const DOWNLOADS_SUBDIR: &str = ".downloads";

/// File extension of persisted build records
pub const RECORD_EXTENSION: &str = "rec";

/// File extension of recipes
pub const RECIPE_EXTENSION: &str = "json";

/// Maximum number of download retry attempts
pub const MAX_DOWNLOAD_RETRIES: u32 = 3;

/// Interval between attempts to take a held repository lock (in milliseconds)
pub const LOCK_POLL_INTERVAL_MS: u64 = 500;

/// Environment variable overriding the target triplet
pub const ENV_TARGET_TRIPLET: &str = "STRAPKIT_TARGET_TRIPLET";

/// Environment variable overriding the host triplet
pub const ENV_HOST_TRIPLET: &str = "STRAPKIT_HOST_TRIPLET";

/// Environment variable overriding the number of build workers
pub const ENV_JOBS: &str = "STRAPKIT_JOBS";

/// Environment variable naming the stage status file
pub const ENV_STAGE_STATUS: &str = "STRAPKIT_STAGE_STATUS";

/// Notice written to the build record directory by `setup-env`
pub const PKGINFO_README: &str = "Modifying any of the contents of the files in this directory can be fatal, \
and require you to rebuild all the packages!\nLeave, unless you know what you are doing.\n";
