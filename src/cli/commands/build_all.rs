//! CLI implementation for `strapkit build-all`

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use super::{lock_repository, open_repository};
use crate::cli::output::{create_build_bar, is_json, print_detail, print_json, print_success, status};
use crate::core::builder::Builder;
use crate::core::graph::DependencyGraph;
use crate::core::scheduler::{ScheduleEvent, ScheduleReport, Scheduler};

/// Execute the build-all command
pub async fn execute(root: &Path, packages: &[String], jobs: Option<usize>) -> Result<()> {
    let mut config = open_repository(root)?;
    if let Some(jobs) = jobs {
        config = config.with_jobs(jobs);
    }

    let _lock = lock_repository(root).await?;
    let builder = Builder::new(Arc::new(config));

    let roots = if packages.is_empty() {
        builder.recipes().names()?
    } else {
        packages.to_vec()
    };

    let graph = DependencyGraph::build(&roots, builder.recipes())
        .context("Failed to resolve package dependencies")?;

    if graph.is_empty() {
        print_success("Nothing to build");
        return Ok(());
    }

    let scheduler = Scheduler::new(builder);
    info!("Building {} packages with {} jobs", graph.len(), scheduler.jobs());

    let bar = create_build_bar(graph.len() as u64);
    let progress = bar.clone();
    let scheduler = scheduler.with_progress(Box::new(move |event| match event {
        ScheduleEvent::Started(name) => progress.set_message(name.to_string()),
        ScheduleEvent::Succeeded(name) => {
            progress.inc(1);
            progress.println(format!("{} {name}", status::SUCCESS));
        }
        ScheduleEvent::Failed(name, error) => {
            progress.inc(1);
            progress.println(format!("{} {name}: {error}", status::ERROR));
        }
    }));

    let outcome = scheduler.build_all(&graph).await;
    bar.finish_and_clear();
    let report = outcome.context("Build aborted")?;

    summarize(&report);

    if !report.is_success() {
        bail!(
            "{} package(s) failed and {} were blocked by failed dependencies",
            report.failed.len(),
            report.blocked.len()
        );
    }

    Ok(())
}

fn summarize(report: &ScheduleReport) {
    if is_json() {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(name, error)| serde_json::json!({ "name": name, "error": error.to_string() }))
            .collect();
        print_json(&serde_json::json!({
            "status": if report.is_success() { "success" } else { "error" },
            "succeeded": report.succeeded,
            "failed": failed,
            "blocked": report.blocked,
        }));
        return;
    }

    if report.is_success() {
        print_success(&format!("Built {} packages", report.succeeded.len()));
        return;
    }

    print_detail(&format!("Installed: {}", report.succeeded.len()));
    for (name, error) in &report.failed {
        eprintln!("{} {name}: {}", status::ERROR, error.root_cause());
    }
    for name in &report.blocked {
        eprintln!("{} {name} (blocked)", status::BLOCKED);
    }
}
