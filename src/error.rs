//! Error types for strapkit
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Build record persistence errors
#[derive(Error, Debug)]
pub enum RecordError {
    /// The persisted record is structurally inconsistent.
    ///
    /// Never retried: continuing could rebuild for the wrong target or skip
    /// stages that still need to run.
    #[error("Invalid or corrupt package info for package '{package}': {reason}")]
    Corrupt { package: String, reason: String },

    /// A record from an older format without a triplet
    #[error("Outdated package info for package '{package}'. Run 'strapkit rebuild {package}' to rebuild the package")]
    Outdated { package: String },

    /// The record was configured with the other cross compilation mode
    #[error(
        "Package '{package}' was configured with cross compilation {}, but it is {} now. Run 'strapkit rebuild {package}' to rebuild the package",
        cross_mode(.recorded),
        cross_mode(.current)
    )]
    CrossModeMismatch {
        package: String,
        recorded: bool,
        current: bool,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

impl RecordError {
    /// Whether this error must terminate the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Corrupt { .. } | Self::Outdated { .. } | Self::CrossModeMismatch { .. }
        )
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn cross_mode(enabled: &bool) -> &'static str {
    if *enabled {
        "enabled"
    } else {
        "disabled"
    }
}

/// Recipe loading errors
#[derive(Error, Debug)]
pub enum RecipeError {
    /// No recipe file exists for the package
    #[error("Invalid or unknown package '{name}'")]
    NotFound { name: String },

    /// Recipe file could not be read
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Recipe file is not valid JSON or misses a required field
    #[error("Failed to parse recipe '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Recipe name differs from its file name
    #[error("Recipe '{path}' declares name '{declared}'")]
    NameMismatch { path: PathBuf, declared: String },

    /// Malformed dependency expression
    #[error("Malformed dependency expression '{expression}' in package '{package}'")]
    MalformedDependency { package: String, expression: String },

    /// Malformed version string
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Substitution failure inside a field
    #[error("In field '{field}' of package '{package}': {reason}")]
    Substitution {
        package: String,
        field: String,
        reason: String,
    },
}

/// Dependency graph construction errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    Cycle { cycle: Vec<String> },

    /// Dependency that has no recipe
    #[error("Missing dependency: '{dependency}' required by '{package}'")]
    UnknownPackage { package: String, dependency: String },

    /// Version constraint that the recipe version cannot satisfy
    #[error("Package '{package}' requires '{constraint}', but '{dependency}' is at version {version}")]
    Unsatisfiable {
        package: String,
        dependency: String,
        constraint: String,
        version: String,
    },

    /// Recipe error while materialising a node
    #[error(transparent)]
    Recipe(#[from] RecipeError),
}

/// Stage execution errors
#[derive(Error, Debug)]
pub enum StageError {
    /// A command exited with a non-zero status
    #[error("Command '{command}' failed with exit status {status}")]
    CommandFailed { command: String, status: i32 },

    /// An argument cannot be quoted for the stage shell
    #[error("Argument '{argument}' contains a double quote and cannot be passed to the stage shell")]
    UnquotableArgument { argument: String },

    /// The shell could not be spawned
    #[error("Failed to spawn stage shell: {error}")]
    SpawnFailed { error: String },
}

/// HTTP download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}'")]
    ChecksumFailed { file: String },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },

    /// Max retries exceeded
    #[error("Download failed after {retries} retries: {url}")]
    MaxRetriesExceeded { url: String, retries: u32 },
}

/// Source acquisition errors
#[derive(Error, Debug)]
pub enum FetchError {
    /// Archive download failed
    #[error("Failed to download sources of '{package}': {source}")]
    Download {
        package: String,
        source: DownloadError,
    },

    /// An external tool (tar, git, patch) failed
    #[error("'{tool}' failed with exit status {status} while fetching '{package}'")]
    ToolFailed {
        package: String,
        tool: String,
        status: i32,
    },

    /// An external tool could not be spawned
    #[error("Failed to run '{tool}': {error}")]
    SpawnFailed { tool: String, error: String },

    /// Filesystem error while preparing the source directory
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Errors raised while advancing a package
#[derive(Error, Debug)]
pub enum BuildError {
    /// Recipe could not be loaded
    #[error(transparent)]
    Recipe(#[from] RecipeError),

    /// Build record could not be read or written
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Dependency has no recipe
    #[error("Package '{package}' depends on unknown package '{dependency}'")]
    UnknownDependency { package: String, dependency: String },

    /// Dependency version does not satisfy the constraint
    #[error("Package '{package}' requires '{constraint}', but '{dependency}' is at version {version}")]
    UnsatisfiedConstraint {
        package: String,
        dependency: String,
        constraint: String,
        version: String,
    },

    /// Dependency chain loops back onto itself
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// Dependency failed to build
    #[error("Dependency '{dependency}' of '{package}' failed: {source}")]
    Dependency {
        package: String,
        dependency: String,
        source: Box<BuildError>,
    },

    /// Source acquisition failed
    #[error("Fetching '{package}' failed: {source}")]
    Fetch { package: String, source: FetchError },

    /// A stage command failed
    #[error("Stage '{stage}' of '{package}' failed: {source}")]
    Stage {
        package: String,
        stage: String,
        source: StageError,
    },

    /// Worker task died
    #[error("Worker for '{package}' did not complete: {error}")]
    Worker { package: String, error: String },
}

impl BuildError {
    /// Whether this error must terminate the whole run rather than one subtree
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Record(e) => e.is_fatal(),
            Self::Dependency { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// The innermost error of a dependency chain
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Errors raised while pulling recipe changes
#[derive(Error, Debug)]
pub enum UpdateError {
    /// git could not pull or diff the repository
    #[error("Failed to pull recipe changes")]
    Git(#[source] FetchError),

    /// Rebuilding a changed package hit an error that stops the run
    #[error("Failed to rebuild '{package}'")]
    Rebuild {
        package: String,
        #[source]
        source: BuildError,
    },
}

/// Errors raised while entering the install prefix
#[derive(Error, Debug)]
pub enum ChrootError {
    /// The root could not be changed
    #[error("Failed to change root to '{path}': {error}")]
    Chroot { path: PathBuf, error: String },

    /// The command could not be executed inside the new root
    #[error("Failed to execute '{program}': {error}")]
    Exec { program: String, error: String },
}

/// Repository lock errors
#[derive(Error, Debug)]
pub enum LockError {
    /// Lock file could not be created or removed
    #[error("Failed to access lock file '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: PathBuf, error: String },

    /// Config file could not be parsed
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: PathBuf, error: String },

    /// Invalid value in configuration or environment
    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: String, value: String },

    /// A required directory is missing
    #[error("Required directory '{path}' is missing. Did you forget to run 'strapkit setup-env'?")]
    MissingDirectory { path: PathBuf },

    /// The recipes directory is missing
    #[error("Could not find recipes directory '{path}'")]
    MissingRecipes { path: PathBuf },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },
}
