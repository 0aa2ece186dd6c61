//! Test utilities
//!
//! Proptest generators plus a throwaway repository fixture with the standard
//! directory layout and helpers to write recipes into it.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;

use crate::core::builder::Builder;
use crate::core::config::Config;

pub const HOST: &str = "x86_64-linux-gnu";
pub const TARGET: &str = "x86_64-obos";

pub mod generators {
    use proptest::prelude::*;

    /// Generate a valid package name
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}"
    }

    /// Generate a version string with byte-sized components
    pub fn version() -> impl Strategy<Value = String> {
        any::<(u8, u8, u8)>().prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}"))
    }

    /// Generate a dependency operator as written in recipes
    pub fn operator() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("<"), Just("<="), Just(">"), Just(">="), Just("==")]
    }
}

/// A temporary repository with every directory in place
pub struct TestRepo {
    pub dir: TempDir,
    pub config: Arc<Config>,
}

impl TestRepo {
    /// Native build repository
    pub fn new() -> Self {
        Self::with_triplets(HOST, HOST)
    }

    /// Cross compiling repository
    pub fn cross() -> Self {
        Self::with_triplets(HOST, TARGET)
    }

    pub fn with_triplets(host: &str, target: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let config = Config::for_root(dir.path(), host, target).with_jobs(4);
        std::fs::create_dir_all(&config.dirs.recipes).expect("Failed to create recipes directory");
        for dir in config.dirs.working_dirs() {
            std::fs::create_dir_all(dir).expect("Failed to create directory");
        }
        Self {
            dir,
            config: Arc::new(config),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// A builder with a fresh recipe cache
    pub fn builder(&self) -> Builder {
        Builder::new(Arc::clone(&self.config))
    }

    /// Write a recipe from raw JSON
    pub fn write_recipe(&self, recipe: &Value) {
        let name = recipe["name"].as_str().expect("recipe needs a name");
        std::fs::write(
            self.config.dirs.recipes.join(format!("{name}.json")),
            serde_json::to_string_pretty(recipe).expect("Failed to serialize recipe"),
        )
        .expect("Failed to write recipe");
    }

    /// Sourceless recipe whose stages append `<name>:<stage>` to `log.txt`
    pub fn recipe(&self, name: &str, version: &str, depends: &[&str]) -> Value {
        let log = |stage: &str| json!([["sh", "-c", format!("echo {name}:{stage} >> log.txt")]]);
        json!({
            "name": name,
            "version": version,
            "depends": depends,
            "bootstrap-commands": log("configure"),
            "build-commands": log("build"),
            "install-commands": log("install"),
            "run-commands": log("run"),
        })
    }

    /// Write a logging recipe
    pub fn add(&self, name: &str, version: &str, depends: &[&str]) {
        self.write_recipe(&self.recipe(name, version, depends));
    }

    /// Lines of `log.txt`, in order
    pub fn log(&self) -> Vec<String> {
        std::fs::read_to_string(self.root().join("log.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Position of a log line
    pub fn log_position(&self, line: &str) -> Option<usize> {
        self.log().iter().position(|l| l == line)
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::version::{Dependency, Version};
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_generated_versions_parse(v in version()) {
            prop_assert!(v.parse::<Version>().is_ok());
        }

        #[test]
        fn test_generated_dependencies_parse(name in package_name(), op in operator(), v in version()) {
            let expr = format!("{name}{op}{v}");
            let dep = Dependency::parse("p", &expr).unwrap();
            prop_assert_eq!(&dep.name, &name);
            prop_assert_eq!(dep.to_string(), expr);
        }
    }
}
