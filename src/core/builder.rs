//! Per-package build state machine
//!
//! [`Builder::advance`] moves one package forward through
//! fetch → configure → build → install, skipping every stage its build record
//! says is already done and persisting the record after each stage that
//! completes. Dependencies can be brought up to `installed` on the way.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use tracing::{debug, info};

use crate::core::config::Config;
use crate::core::fetch::SourceFetcher;
use crate::core::package::{Command, PackageDescriptor};
use crate::core::recipe::RecipeBook;
use crate::core::record::{BuildRecord, BuildState, RecordStore};
use crate::core::stage::StageRunner;
use crate::error::BuildError;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct Inner {
    config: Arc<Config>,
    recipes: Arc<RecipeBook>,
    records: RecordStore,
    stages: StageRunner,
    fetcher: SourceFetcher,
}

/// Drives packages through their build stages; cheap to clone
#[derive(Clone)]
pub struct Builder {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Builder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Builder")
            .field("root", &self.inner.config.root)
            .finish_non_exhaustive()
    }
}

impl Builder {
    pub fn new(config: Arc<Config>) -> Self {
        let recipes = Arc::new(RecipeBook::new(Arc::clone(&config)));
        let fetcher = SourceFetcher::new(&config);
        Self::with_parts(config, recipes, fetcher)
    }

    /// Builder sharing an existing recipe book
    pub fn with_parts(config: Arc<Config>, recipes: Arc<RecipeBook>, fetcher: SourceFetcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: RecordStore::from_config(&config),
                stages: StageRunner::new(&config.root),
                fetcher,
                recipes,
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn recipes(&self) -> &Arc<RecipeBook> {
        &self.inner.recipes
    }

    pub fn records(&self) -> &RecordStore {
        &self.inner.records
    }

    /// Bring `name` up to `built`, or `installed` when `install` is set.
    ///
    /// With `satisfy_dependencies`, every dependency is first checked against
    /// its version constraint and installed if it is not yet.
    pub async fn advance(&self, name: &str, install: bool, satisfy_dependencies: bool) -> Result<(), BuildError> {
        let mut stack = Vec::new();
        self.advance_with(name, install, satisfy_dependencies, &mut stack)
            .await
    }

    /// Start `name` over from a clean record, keeping it installed if it was
    pub async fn rebuild(&self, name: &str) -> Result<(), BuildError> {
        self.inner.recipes.load(name)?;
        // Mismatched records are what a rebuild recovers from
        let was_installed = matches!(
            self.inner.records.read_unvalidated(name),
            Ok(Some(record)) if record.state == BuildState::Installed
        );

        info!("{name}: rebuilding from scratch");
        self.inner.records.write(name, &BuildRecord::clean())?;

        self.advance(name, was_installed, true).await
    }

    /// Install `name` and its dependencies, then run its run commands
    pub async fn run(&self, name: &str) -> Result<(), BuildError> {
        self.advance(name, true, true).await?;
        let pkg = self.inner.recipes.load(name)?;
        self.run_stage(&pkg, "run", &pkg.run).await
    }

    fn advance_with<'a>(
        &'a self,
        name: &'a str,
        install: bool,
        satisfy_dependencies: bool,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<(), BuildError>> {
        Box::pin(async move {
            if let Some(start) = stack.iter().position(|n| n == name) {
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                return Err(BuildError::DependencyCycle { cycle });
            }

            let config = &self.inner.config;
            let pkg = self.inner.recipes.load(name)?;
            let mut record = self.inner.records.read(name)?;
            let triplet = pkg.triplet(config).to_string();
            let cross = config.cross_compiling();

            if pkg.builds_for_host(config) && record.state < BuildState::Installed {
                if let Some(probe) = &pkg.host_provides {
                    let provided = self
                        .inner
                        .stages
                        .probe(probe)
                        .await
                        .map_err(|source| BuildError::Stage {
                            package: name.to_string(),
                            stage: "host-provides".to_string(),
                            source,
                        })?;
                    if provided {
                        info!("{name}: provided by the host");
                        let now = SystemTime::now();
                        for state in &BuildState::ALL[1..] {
                            record.complete(*state, now, pkg.version, &triplet, cross);
                        }
                        self.inner.records.write(name, &record)?;
                        return Ok(());
                    }
                    debug!("{name}: host does not provide it, building");
                }
            }

            if satisfy_dependencies {
                stack.push(name.to_string());
                let satisfied = self.satisfy_dependencies(&pkg, stack).await;
                stack.pop();
                satisfied?;
            }

            let mut install = install;
            if record.state >= BuildState::Configured && !pkg.inhibit_auto_rebuild && is_stale(&pkg, &record) {
                info!("{name}: recipe changed since last build, rebuilding");
                install |= record.state == BuildState::Installed;
                record.reset();
                self.inner.records.write(name, &record)?;
            }

            if record.state < BuildState::Fetched {
                info!("{name}: fetching sources");
                self.inner
                    .fetcher
                    .fetch(&pkg)
                    .await
                    .map_err(|source| BuildError::Fetch {
                        package: name.to_string(),
                        source,
                    })?;
                self.complete(&pkg, &mut record, BuildState::Fetched, &triplet)?;
            }

            if record.state < BuildState::Configured {
                self.run_stage(&pkg, "configure", &pkg.bootstrap).await?;
                self.complete(&pkg, &mut record, BuildState::Configured, &triplet)?;
            }

            if record.state < BuildState::Built {
                self.run_stage(&pkg, "build", &pkg.build).await?;
                self.complete(&pkg, &mut record, BuildState::Built, &triplet)?;
            }

            if install && record.state < BuildState::Installed {
                self.run_stage(&pkg, "install", &pkg.install).await?;
                self.complete(&pkg, &mut record, BuildState::Installed, &triplet)?;
            }

            Ok(())
        })
    }

    async fn satisfy_dependencies(&self, pkg: &PackageDescriptor, stack: &mut Vec<String>) -> Result<(), BuildError> {
        for dep in &pkg.dependencies {
            if !self.inner.recipes.contains(&dep.name) {
                return Err(BuildError::UnknownDependency {
                    package: pkg.name.clone(),
                    dependency: dep.name.clone(),
                });
            }

            let dep_pkg = self.inner.recipes.load(&dep.name)?;
            let dep_record = self.inner.records.read(&dep.name)?;
            let have = if dep_record.state >= BuildState::Built {
                dep_record.version
            } else {
                dep_pkg.version
            };

            if !dep.accepts(have) {
                return Err(BuildError::UnsatisfiedConstraint {
                    package: pkg.name.clone(),
                    dependency: dep.name.clone(),
                    constraint: dep.constraint(),
                    version: have.to_string(),
                });
            }

            if dep_record.state < BuildState::Installed {
                debug!("{}: satisfying dependency {}", pkg.name, dep.name);
                self.advance_with(&dep.name, true, true, stack)
                    .await
                    .map_err(|source| BuildError::Dependency {
                        package: pkg.name.clone(),
                        dependency: dep.name.clone(),
                        source: Box::new(source),
                    })?;
            }
        }
        Ok(())
    }

    async fn run_stage(&self, pkg: &PackageDescriptor, stage: &str, commands: &[Command]) -> Result<(), BuildError> {
        self.inner
            .stages
            .run(&pkg.name, stage, commands)
            .await
            .map_err(|source| BuildError::Stage {
                package: pkg.name.clone(),
                stage: stage.to_string(),
                source,
            })
    }

    fn complete(
        &self,
        pkg: &PackageDescriptor,
        record: &mut BuildRecord,
        state: BuildState,
        triplet: &str,
    ) -> Result<(), BuildError> {
        record.complete(
            state,
            SystemTime::now(),
            pkg.version,
            triplet,
            self.inner.config.cross_compiling(),
        );
        self.inner.records.write(&pkg.name, record)?;
        info!("{}: {}", pkg.name, state);
        Ok(())
    }
}

/// Recorded build no longer matches the recipe
fn is_stale(pkg: &PackageDescriptor, record: &BuildRecord) -> bool {
    if record.version != pkg.version {
        return true;
    }
    match (pkg.recipe_modified, record.newest_stamp()) {
        (Some(modified), Some(stamp)) => modified > stamp,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::version::Version;
    use crate::error::{RecordError, StageError};
    use crate::test_utils::{TestRepo, HOST as HOST_TRIPLET};
    use serde_json::json;

    fn state(repo: &TestRepo, name: &str) -> Option<BuildState> {
        repo.builder()
            .records()
            .read_unvalidated(name)
            .unwrap()
            .map(|r| r.state)
    }

    #[tokio::test]
    async fn test_advance_installs_dependencies_first() {
        let repo = TestRepo::new();
        repo.add("libc", "1.0.0", &[]);
        repo.add("app", "1.0.0", &["libc>=1.0.0"]);

        repo.builder().advance("app", true, true).await.unwrap();

        assert_eq!(
            repo.log(),
            vec![
                "libc:configure", "libc:build", "libc:install",
                "app:configure", "app:build", "app:install",
            ]
        );
        assert_eq!(state(&repo, "libc"), Some(BuildState::Installed));
        assert_eq!(state(&repo, "app"), Some(BuildState::Installed));
    }

    #[tokio::test]
    async fn test_advance_is_idempotent() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);

        repo.builder().advance("zlib", true, true).await.unwrap();
        let first = repo.log();
        repo.builder().advance("zlib", true, true).await.unwrap();

        assert_eq!(repo.log(), first);
    }

    #[tokio::test]
    async fn test_build_without_install_stops_at_built() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);

        repo.builder().advance("zlib", false, true).await.unwrap();
        assert_eq!(state(&repo, "zlib"), Some(BuildState::Built));
        assert_eq!(repo.log_position("zlib:install"), None);
    }

    #[tokio::test]
    async fn test_failed_stage_resumes_where_it_stopped() {
        let repo = TestRepo::new();
        let mut recipe = repo.recipe("gcc", "13.2.0", &[]);
        recipe["build-commands"] = json!([["sh", "-c", "echo gcc:build >> log.txt"], ["test", "-f", "allow"]]);
        repo.write_recipe(&recipe);

        let err = repo.builder().advance("gcc", true, true).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::Stage { ref stage, source: StageError::CommandFailed { status: 1, .. }, .. } if stage == "build"
        ));
        assert_eq!(state(&repo, "gcc"), Some(BuildState::Configured));

        std::fs::write(repo.root().join("allow"), "").unwrap();
        repo.builder().advance("gcc", true, true).await.unwrap();

        assert_eq!(
            repo.log(),
            vec!["gcc:configure", "gcc:build", "gcc:build", "gcc:install"]
        );
    }

    #[tokio::test]
    async fn test_version_gate_blocks_before_any_stage() {
        let repo = TestRepo::new();
        repo.add("foo", "1.0.0", &[]);
        repo.add("bar", "1.0.0", &["foo>=2.0.0"]);

        let err = repo.builder().advance("bar", true, true).await.unwrap_err();
        assert!(matches!(err, BuildError::UnsatisfiedConstraint { ref version, .. } if version == "1.0.0"));
        assert!(repo.log().is_empty());
        assert_ne!(state(&repo, "bar"), Some(BuildState::Installed));
    }

    #[tokio::test]
    async fn test_recorded_version_wins_over_recipe() {
        let repo = TestRepo::new();
        repo.add("foo", "2.0.0", &[]);
        repo.add("bar", "1.0.0", &["foo>=2.0.0"]);
        repo.builder().advance("foo", false, true).await.unwrap();

        // A recipe downgrade does not matter while the built 2.0.0 is recorded
        let mut recipe = repo.recipe("foo", "1.0.0", &[]);
        recipe["inhibit-auto-rebuild"] = json!(true);
        repo.write_recipe(&recipe);

        repo.builder().advance("bar", true, true).await.unwrap();
        assert_eq!(state(&repo, "bar"), Some(BuildState::Installed));
    }

    #[tokio::test]
    async fn test_unknown_dependency() {
        let repo = TestRepo::new();
        repo.add("app", "1.0.0", &["ghost"]);

        let err = repo.builder().advance("app", true, true).await.unwrap_err();
        assert!(matches!(err, BuildError::UnknownDependency { ref dependency, .. } if dependency == "ghost"));
    }

    #[tokio::test]
    async fn test_dependency_cycle_is_rejected() {
        let repo = TestRepo::new();
        repo.add("a", "1.0.0", &["b"]);
        repo.add("b", "1.0.0", &["a"]);

        let err = repo.builder().advance("a", true, true).await.unwrap_err();
        match err.root_cause() {
            BuildError::DependencyCycle { cycle } => assert_eq!(cycle, &["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(repo.log().is_empty());
    }

    #[tokio::test]
    async fn test_version_drift_triggers_rebuild() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.0", &[]);
        repo.builder().advance("zlib", true, true).await.unwrap();

        repo.add("zlib", "1.3.1", &[]);
        // Build only, but install intent survives the reset
        repo.builder().advance("zlib", false, true).await.unwrap();

        assert_eq!(repo.log().len(), 6);
        let record = repo.builder().records().read("zlib").unwrap();
        assert_eq!(record.state, BuildState::Installed);
        assert_eq!(record.version, Version::new(1, 3, 1));
    }

    #[tokio::test]
    async fn test_inhibit_auto_rebuild() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.0", &[]);
        repo.builder().advance("zlib", true, true).await.unwrap();

        let mut recipe = repo.recipe("zlib", "1.3.1", &[]);
        recipe["inhibit-auto-rebuild"] = json!(1);
        repo.write_recipe(&recipe);
        repo.builder().advance("zlib", true, true).await.unwrap();

        assert_eq!(repo.log().len(), 3);
    }

    #[tokio::test]
    async fn test_rebuild_keeps_install_intent() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);
        let builder = repo.builder();
        builder.advance("zlib", true, true).await.unwrap();

        builder.rebuild("zlib").await.unwrap();
        assert_eq!(repo.log().len(), 6);
        assert_eq!(state(&repo, "zlib"), Some(BuildState::Installed));
    }

    #[tokio::test]
    async fn test_cross_mode_mismatch_needs_rebuild() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);
        let builder = repo.builder();
        let mut record = BuildRecord::clean();
        for stage in [BuildState::Fetched, BuildState::Configured, BuildState::Built, BuildState::Installed] {
            record.complete(stage, SystemTime::now(), Version::new(1, 3, 1), HOST_TRIPLET, true);
        }
        builder.records().write("zlib", &record).unwrap();

        let err = builder.advance("zlib", true, true).await.unwrap_err();
        assert!(matches!(err, BuildError::Record(RecordError::CrossModeMismatch { .. })));
        assert!(repo.log().is_empty());

        builder.rebuild("zlib").await.unwrap();
        assert_eq!(repo.log(), vec!["zlib:configure", "zlib:build", "zlib:install"]);
        assert!(!builder.records().read("zlib").unwrap().cross_compiled);
    }

    #[tokio::test]
    async fn test_rebuild_of_built_package_does_not_install() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);
        let builder = repo.builder();
        builder.advance("zlib", false, true).await.unwrap();

        builder.rebuild("zlib").await.unwrap();
        assert_eq!(state(&repo, "zlib"), Some(BuildState::Built));
    }

    #[tokio::test]
    async fn test_run_installs_then_runs() {
        let repo = TestRepo::new();
        repo.add("tool", "1.0.0", &[]);

        repo.builder().run("tool").await.unwrap();
        assert_eq!(repo.log().last().map(String::as_str), Some("tool:run"));
        assert_eq!(state(&repo, "tool"), Some(BuildState::Installed));
    }

    #[tokio::test]
    async fn test_host_provided_package_skips_stages() {
        let repo = TestRepo::cross();
        let mut recipe = repo.recipe("bison", "3.8.2", &[]);
        recipe["host-package"] = json!(true);
        recipe["host-provides"] = json!("true");
        repo.write_recipe(&recipe);

        repo.builder().advance("bison", true, true).await.unwrap();

        assert!(repo.log().is_empty());
        let record = repo.builder().records().read("bison").unwrap();
        assert_eq!(record.state, BuildState::Installed);
        assert_eq!(record.host_triplet, crate::test_utils::HOST);
        assert!(record.installed_at.is_some());
    }

    #[tokio::test]
    async fn test_host_probe_failure_builds_normally() {
        let repo = TestRepo::cross();
        let mut recipe = repo.recipe("bison", "3.8.2", &[]);
        recipe["host-package"] = json!(true);
        recipe["host-provides"] = json!("false");
        repo.write_recipe(&recipe);

        repo.builder().advance("bison", true, true).await.unwrap();
        assert_eq!(repo.log().len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_fatal() {
        let repo = TestRepo::new();
        repo.add("zlib", "1.3.1", &[]);
        repo.add("app", "1.0.0", &["zlib"]);
        let builder = repo.builder();
        std::fs::write(builder.records().path("zlib"), b"garbage").unwrap();

        let err = builder.advance("app", true, true).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, BuildError::Record(RecordError::Corrupt { .. })));
        assert!(repo.log().is_empty());
    }
}
