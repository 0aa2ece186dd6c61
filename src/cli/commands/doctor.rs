//! CLI command for `strapkit doctor`
//!
//! Checks system dependencies and the repository, and reports issues with
//! suggestions.

use std::path::Path;

use anyhow::Result;

use crate::cli::output::{is_json, is_quiet, print_detail, print_info, print_json, print_success, print_warning, status};
use crate::core::config::Config;
use crate::core::doctor::{run_doctor, DoctorReport};

/// Execute the doctor command
pub async fn execute(root: &Path) -> Result<()> {
    let config = Config::load(root);
    let mut report = run_doctor(config.as_ref().ok());
    if let Err(e) = &config {
        report.add_config_issue(e.to_string());
    }

    if is_json() {
        print_report_json(&report);
    } else if !is_quiet() {
        print_report(&report);
    } else {
        for check in report.checks.iter().filter(|c| c.required && !c.passed) {
            eprintln!("{} Missing required: {}", status::ERROR, check.name);
        }
    }

    if !report.all_required_passed() {
        anyhow::bail!("Missing required dependencies. Run 'strapkit doctor' for details.");
    }
    Ok(())
}

fn print_report_json(report: &DoctorReport) {
    let status = if report.all_passed() {
        "success"
    } else if report.all_required_passed() {
        "warning"
    } else {
        "error"
    };
    print_json(&serde_json::json!({
        "status": status,
        "checks": report.checks.iter().map(|c| serde_json::json!({
            "name": c.name,
            "passed": c.passed,
            "required": c.required,
            "version": c.version,
            "path": c.path,
            "error": c.error,
            "suggestion": c.suggestion
        })).collect::<Vec<_>>(),
        "config_issues": report.config_issues,
        "passed_count": report.passed_count(),
        "total_count": report.checks.len()
    }));
}

fn print_report(report: &DoctorReport) {
    print_info("Checking system dependencies...");
    println!();

    for check in &report.checks {
        let version_str = check
            .version
            .as_ref()
            .map(|v| format!(" (v{v})"))
            .unwrap_or_default();
        let required_str = if check.required { "" } else { " [optional]" };

        if check.passed {
            println!("  {} {}{version_str}{required_str}", status::SUCCESS, check.name);
        } else {
            println!("  {} {}{required_str}", status::ERROR, check.name);
            if let Some(error) = &check.error {
                print_detail(&format!("Error: {error}"));
            }
            if let Some(suggestion) = &check.suggestion {
                print_detail(&format!("Suggestion: {suggestion}"));
            }
        }
    }

    if !report.config_issues.is_empty() {
        println!();
        print_warning("Repository issues:");
        for issue in &report.config_issues {
            print_detail(&format!("• {issue}"));
        }
    }

    println!();
    let passed = report.passed_count();
    let total = report.checks.len();
    if report.all_passed() {
        print_success(&format!("All checks passed ({passed}/{total})"));
    } else if report.all_required_passed() {
        print_warning(&format!("{passed}/{total} checks passed"));
    } else {
        println!("{} {passed}/{total} checks passed", status::ERROR);
    }
}
