//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

pub const HOST: &str = "x86_64-linux-gnu";

/// Test repository context
///
/// Creates a temporary repository with a `strapkit.toml` pinning the
/// triplets, and provides utilities for writing recipes and running the
/// binary inside it.
pub struct TestProject {
    /// Temporary directory for the test repository
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test repository with an empty recipes directory
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_file(
            "strapkit.toml",
            &format!("host-triplet = \"{HOST}\"\ntarget-triplet = \"{HOST}\"\njobs = 2\n"),
        );
        project.create_dir("recipes");
        project
    }

    /// Create a repository and run `setup-env` in it
    pub fn set_up() -> Self {
        let project = Self::new();
        let output = project.run(&["setup-env"]);
        assert!(
            output.status.success(),
            "Failed to set up repository: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        project
    }

    /// Get the path to the test repository
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test repository
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test repository
    pub fn create_dir(&self, name: &str) {
        std::fs::create_dir_all(self.dir.path().join(name)).expect("Failed to create directory");
    }

    /// Check if a file exists in the test repository
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Write a recipe from raw JSON
    pub fn write_recipe(&self, recipe: &Value) {
        let name = recipe["name"].as_str().expect("recipe needs a name");
        self.create_file(
            &format!("recipes/{name}.json"),
            &serde_json::to_string_pretty(recipe).expect("Failed to serialize recipe"),
        );
    }

    /// Sourceless recipe whose stages append `<name>:<stage>` to `log.txt`
    pub fn add(&self, name: &str, depends: &[&str]) {
        self.write_recipe(&logging_recipe(name, depends));
    }

    /// Lines of `log.txt`, in order
    pub fn log(&self) -> Vec<String> {
        std::fs::read_to_string(self.dir.path().join("log.txt"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Run strapkit in the repository with a clean environment
    pub fn run(&self, args: &[&str]) -> Output {
        run_in(self.dir.path(), args)
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Run strapkit in `dir`
pub fn run_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_strapkit"))
        .current_dir(dir)
        .args(args)
        .env_remove("STRAPKIT_HOST_TRIPLET")
        .env_remove("STRAPKIT_TARGET_TRIPLET")
        .env_remove("STRAPKIT_JOBS")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute strapkit")
}

/// Recipe JSON whose stages log to `log.txt` in the repository root
pub fn logging_recipe(name: &str, depends: &[&str]) -> Value {
    let log = |stage: &str| json!([["sh", "-c", format!("echo {name}:{stage} >> log.txt")]]);
    json!({
        "name": name,
        "description": format!("test package {name}"),
        "version": "1.0.0",
        "depends": depends,
        "bootstrap-commands": log("configure"),
        "build-commands": log("build"),
        "install-commands": log("install"),
        "run-commands": log("run"),
    })
}

/// Run git in `dir`, panicking on failure
pub fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("Failed to execute git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Whether git is installed
pub fn has_git() -> bool {
    which::which("git").is_ok()
}

/// Stdout as a string
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Stderr as a string
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}
