//! Doctor command logic
//!
//! Checks that the external tools strapkit shells out to are installed and
//! that the repository is laid out correctly.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use crate::core::config::Config;
use crate::core::recipe::RecipeBook;

/// Result of a single dependency check
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the dependency being checked
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Version if available
    pub version: Option<String>,
    /// Where the tool was found
    pub path: Option<PathBuf>,
    /// Error message if check failed
    pub error: Option<String>,
    /// Suggestion for fixing the issue
    pub suggestion: Option<String>,
    /// Whether this is a required or optional dependency
    pub required: bool,
}

impl CheckResult {
    /// Create a passing check result
    pub fn pass(name: &str, path: Option<PathBuf>, version: Option<String>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            version,
            path,
            error: None,
            suggestion: None,
            required,
        }
    }

    /// Create a failing check result
    pub fn fail(name: &str, error: &str, suggestion: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            version: None,
            path: None,
            error: Some(error.to_string()),
            suggestion: suggestion.map(String::from),
            required,
        }
    }
}

/// Overall doctor report
#[derive(Debug, Default)]
pub struct DoctorReport {
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Repository issues found
    pub config_issues: Vec<String>,
}

impl DoctorReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_check(&mut self, result: CheckResult) {
        self.checks.push(result);
    }

    pub fn add_config_issue(&mut self, issue: String) {
        self.config_issues.push(issue);
    }

    /// Check if all required checks passed
    pub fn all_required_passed(&self) -> bool {
        self.checks.iter().filter(|c| c.required).all(|c| c.passed)
    }

    /// Check if all checks passed and the repository has no issues
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed) && self.config_issues.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }
}

/// External tools: (program, used for, required)
pub const TOOLS: &[(&str, &str, bool)] = &[
    ("bash", "runs stage commands", true),
    ("tar", "extracts source archives", true),
    ("git", "clones version-controlled sources", true),
    ("patch", "applies recipe patches", true),
    ("make", "used by most recipes", false),
];

/// Locate `command` on PATH and ask it for its version
pub fn check_command_available(command: &str) -> Option<(PathBuf, Option<String>)> {
    let path = which::which(command).ok()?;
    let version = std::process::Command::new(&path)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| {
            let combined = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            extract_version(&combined)
        });
    Some((path, version))
}

/// Extract version string from command output
fn extract_version(output: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"v?(\d+\.\d+(?:\.\d+)?(?:-\w+)?)").expect("Invalid version pattern")
    });
    pattern
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check one external tool
pub fn check_tool(program: &str, purpose: &str, required: bool) -> CheckResult {
    match check_command_available(program) {
        Some((path, version)) => CheckResult::pass(program, Some(path), version, required),
        None => CheckResult::fail(
            program,
            &format!("'{program}' not found in PATH ({purpose})"),
            Some(&format!("Install '{program}' with your system package manager")),
            required,
        ),
    }
}

/// Check the repository layout and that every recipe loads
pub fn check_repository(config: &Config) -> Vec<String> {
    let mut issues = Vec::new();

    if let Err(e) = config.ensure_layout() {
        issues.push(e.to_string());
    }

    if config.dirs.recipes.is_dir() {
        let book = RecipeBook::new(std::sync::Arc::new(config.clone()));
        match book.names() {
            Ok(names) => {
                for name in names {
                    if let Err(e) = book.load(&name) {
                        issues.push(e.to_string());
                    }
                }
            }
            Err(e) => issues.push(e.to_string()),
        }
    }

    issues
}

/// Run all doctor checks
pub fn run_doctor(config: Option<&Config>) -> DoctorReport {
    let mut report = DoctorReport::new();

    for (program, purpose, required) in TOOLS {
        report.add_check(check_tool(program, purpose, *required));
    }

    if let Some(config) = config {
        for issue in check_repository(config) {
            report.add_config_issue(issue);
        }
    }

    report
}
