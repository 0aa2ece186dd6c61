//! Package descriptors
//!
//! The in-memory, already-parsed form of a recipe. Descriptors are produced by
//! [`crate::core::recipe::RecipeBook`] and never change once loaded.

use std::path::PathBuf;
use std::time::SystemTime;

use crate::core::config::Config;
use crate::core::version::{Dependency, Version};

/// Where a package's sources come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Nothing to fetch
    Sourceless,

    /// Archive downloaded over HTTP and extracted
    WebArchive {
        url: String,
        /// Expected SHA-256 of the archive, when the recipe pins one
        sha256: Option<String>,
    },

    /// Repository cloned and checked out at a reference
    VersionControl { url: String, reference: String },
}

/// A patch applied after the sources are fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    /// Patch file
    pub patch: PathBuf,
    /// File the patch modifies, relative to the source directory
    pub target: PathBuf,
    /// Delete the target before patching
    pub delete_before: bool,
}

/// One external-process invocation: program followed by its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub argv: Vec<String>,
}

impl Command {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// Program name
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// A fully loaded package recipe
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub name: String,
    pub description: String,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    pub source: Source,
    pub patches: Vec<Patch>,
    pub bootstrap: Vec<Command>,
    pub build: Vec<Command>,
    pub install: Vec<Command>,
    pub run: Vec<Command>,

    /// Built for the machine doing the build rather than the target
    pub host_package: bool,
    pub supports_binary_packaging: bool,
    pub inhibit_auto_rebuild: bool,

    /// Probe command; if it succeeds the host already provides this package
    pub host_provides: Option<String>,

    /// Recipe file this descriptor was read from
    pub recipe_path: Option<PathBuf>,
    /// Modification time of the recipe file
    pub recipe_modified: Option<SystemTime>,
}

impl PackageDescriptor {
    /// An empty sourceless package, mostly useful as a starting point
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: Version::default(),
            dependencies: Vec::new(),
            source: Source::Sourceless,
            patches: Vec::new(),
            bootstrap: Vec::new(),
            build: Vec::new(),
            install: Vec::new(),
            run: Vec::new(),
            host_package: false,
            supports_binary_packaging: false,
            inhibit_auto_rebuild: false,
            host_provides: None,
            recipe_path: None,
            recipe_modified: None,
        }
    }

    /// Whether this package is built for the host in the current configuration.
    ///
    /// Host packages only differ from target packages when cross compiling.
    pub fn builds_for_host(&self, config: &Config) -> bool {
        self.host_package && config.cross_compiling()
    }

    /// Triplet the package is built for
    pub fn triplet<'a>(&self, config: &'a Config) -> &'a str {
        if self.builds_for_host(config) {
            &config.host_triplet
        } else {
            &config.target_triplet
        }
    }

    /// Install prefix the package goes into
    pub fn prefix(&self, config: &Config) -> PathBuf {
        if self.builds_for_host(config) {
            config.dirs.host_prefix.clone()
        } else {
            config.dirs.prefix.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_package_only_matters_when_cross_compiling() {
        let mut pkg = PackageDescriptor::new("binutils");
        pkg.host_package = true;

        let native = Config::for_root("/repo", "x86_64-linux-gnu", "x86_64-linux-gnu");
        assert!(!pkg.builds_for_host(&native));
        assert_eq!(pkg.prefix(&native), native.dirs.prefix);

        let cross = Config::for_root("/repo", "x86_64-linux-gnu", "aarch64-obos");
        assert!(pkg.builds_for_host(&cross));
        assert_eq!(pkg.triplet(&cross), "x86_64-linux-gnu");
        assert_eq!(pkg.prefix(&cross), cross.dirs.host_prefix);
    }

    #[test]
    fn test_command_display() {
        let cmd = Command::new(["make", "-j4", "install"]);
        assert_eq!(cmd.program(), "make");
        assert_eq!(cmd.to_string(), "make -j4 install");
    }
}
