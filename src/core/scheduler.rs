//! Concurrent build scheduler
//!
//! Walks a [`DependencyGraph`] from its ready set, running one
//! [`Builder::advance`] task per package with at most `jobs` tasks in flight.
//! A package is dispatched only once all of its dependencies have succeeded.
//! A failed package leaves everything depending on it blocked while unrelated
//! branches carry on; record corruption aborts the whole run.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::core::builder::Builder;
use crate::core::graph::{DependencyGraph, NodeId};
use crate::error::BuildError;

/// Progress notification, delivered on the coordinating task
#[derive(Debug)]
pub enum ScheduleEvent<'a> {
    Started(&'a str),
    Succeeded(&'a str),
    Failed(&'a str, &'a BuildError),
}

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(ScheduleEvent<'_>) + Send + Sync>;

/// Outcome of a scheduled build
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Packages that reached `installed`, in completion order
    pub succeeded: Vec<String>,
    /// Packages whose build failed
    pub failed: Vec<(String, BuildError)>,
    /// Packages never started because a dependency failed
    pub blocked: Vec<String>,
}

impl ScheduleReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Builds every package of a graph with bounded parallelism
pub struct Scheduler {
    builder: Builder,
    jobs: usize,
    progress: Option<ProgressCallback>,
}

impl Scheduler {
    /// Scheduler running up to the builder's configured number of jobs
    pub fn new(builder: Builder) -> Self {
        let jobs = builder.config().jobs;
        Self {
            builder,
            jobs: jobs.max(1),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    fn notify(&self, event: ScheduleEvent<'_>) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// Build and install every package in `graph`.
    ///
    /// Returns `Err` only for fatal errors, after every in-flight task has
    /// been aborted. Ordinary package failures are collected in the report.
    pub async fn build_all(&self, graph: &DependencyGraph) -> Result<ScheduleReport, BuildError> {
        let permits = Arc::new(Semaphore::new(self.jobs));
        let mut unsatisfied: Vec<usize> = graph.nodes().map(|(_, node)| node.unsatisfied).collect();
        let mut started = vec![false; graph.len()];
        let mut queue: VecDeque<NodeId> = graph.ready().iter().copied().collect();
        let mut tasks = JoinSet::new();
        let mut in_flight = HashMap::new();
        let mut report = ScheduleReport::default();

        debug!("Scheduling {} packages with {} jobs", graph.len(), self.jobs);

        loop {
            while let Some(&id) = queue.front() {
                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    break;
                };
                queue.pop_front();
                started[id.index()] = true;

                let name = graph.node(id).name().to_string();
                self.notify(ScheduleEvent::Started(&name));

                let builder = self.builder.clone();
                let handle = tasks.spawn(async move {
                    let _permit = permit;
                    builder.advance(&name, true, false).await
                });
                in_flight.insert(handle.id(), id);
            }

            let Some(joined) = tasks.join_next_with_id().await else {
                break;
            };

            let (id, result) = match joined {
                Ok((task, result)) => (in_flight.remove(&task), result),
                Err(e) => {
                    let id = in_flight.remove(&e.id());
                    let package = id.map_or_else(String::new, |id| graph.node(id).name().to_string());
                    (
                        id,
                        Err(BuildError::Worker {
                            package,
                            error: e.to_string(),
                        }),
                    )
                }
            };
            let Some(id) = id else { continue };
            let node = graph.node(id);

            match result {
                Ok(()) => {
                    self.notify(ScheduleEvent::Succeeded(node.name()));
                    report.succeeded.push(node.name().to_string());
                    for &dependant in &node.dependants {
                        let remaining = &mut unsatisfied[dependant.index()];
                        *remaining -= 1;
                        if *remaining == 0 {
                            queue.push_back(dependant);
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("{}: {}", node.name(), e);
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    return Err(e);
                }
                Err(e) => {
                    warn!("{}: {}", node.name(), e);
                    self.notify(ScheduleEvent::Failed(node.name(), &e));
                    report.failed.push((node.name().to_string(), e));
                }
            }
        }

        report.blocked = graph
            .nodes()
            .filter(|(id, _)| !started[id.index()])
            .map(|(_, node)| node.name().to_string())
            .collect();

        Ok(report)
    }
}
