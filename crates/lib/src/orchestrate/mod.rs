//! Build orchestration.
//!
//! A full build transpiles packages wave by wave (every package of depth `n`
//! finishes before depth `n + 1` starts), then bundles all bundled packages in
//! parallel. Failures are collected per package; one package failing never
//! stops work on the others.

pub mod queue;
pub mod watch;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{error, info};

use crate::bundle::{BundleError, BundleResult, bundle_package};
use crate::config::BuildConfig;
use crate::graph::{DependencyGraph, DepthCache, GraphError};
use crate::package::{PackageError, PackageRegistry};
use crate::toolchain::Toolchain;
use crate::transpile::{TranspileError, TranspileResult, transpile_package};

pub use queue::RebuildQueue;
pub use watch::{WatchError, watch};

/// Errors that abort a whole build invocation.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Package(#[from] PackageError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Watch(#[from] WatchError),
}

/// A per-package failure, tagged with the stage it happened in.
#[derive(Debug, Error)]
pub enum StageError {
  #[error(transparent)]
  Transpile(#[from] TranspileError),

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error("{stage} task panicked: {message}")]
  Panicked { stage: Stage, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Transpile,
  Bundle,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Transpile => write!(f, "transpile"),
      Stage::Bundle => write!(f, "bundle"),
    }
  }
}

#[derive(Debug)]
pub struct PackageFailure {
  pub package: String,
  pub error: StageError,
}

impl PackageFailure {
  pub fn stage(&self) -> Stage {
    match self.error {
      StageError::Transpile(_) => Stage::Transpile,
      StageError::Bundle(_) => Stage::Bundle,
      StageError::Panicked { stage, .. } => stage,
    }
  }
}

/// Outcome of a build or rebuild pass.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub transpiled: Vec<TranspileResult>,
  pub bundled: Vec<BundleResult>,
  pub failures: Vec<PackageFailure>,
  pub elapsed: Duration,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }

  fn merge(&mut self, other: BuildReport) {
    self.transpiled.extend(other.transpiled);
    self.bundled.extend(other.bundled);
    self.failures.extend(other.failures);
  }

  fn failed(&self, package: &str) -> bool {
    self.failures.iter().any(|f| f.package == package)
  }
}

/// Everything one build invocation shares across tasks.
#[derive(Debug)]
pub struct BuildContext {
  pub config: BuildConfig,
  pub registry: PackageRegistry,
  pub graph: DependencyGraph,
  /// Transpile waves, shallowest first.
  pub waves: Vec<Vec<String>>,
  pub toolchain: Toolchain,
  jobs: Arc<Semaphore>,
}

impl BuildContext {
  /// Scan the packages directory and prepare a build.
  pub fn load(config: BuildConfig) -> Result<Arc<Self>, BuildError> {
    let registry = PackageRegistry::scan(&config.packages_dir())?;
    Self::new(config, registry).map(Arc::new)
  }

  /// Prepare a build over `registry`.
  ///
  /// A dependency cycle is fatal here, before any work starts.
  pub fn new(config: BuildConfig, registry: PackageRegistry) -> Result<Self, BuildError> {
    let graph = DependencyGraph::from_registry(&registry);
    graph.verify_acyclic()?;
    let waves = graph.group_by_depth(&mut DepthCache::new());
    let toolchain = Toolchain::from_config(&config);
    let jobs = Arc::new(Semaphore::new(config.parallelism.max(1)));

    info!(
      packages = registry.len(),
      waves = waves.len(),
      root = %config.root.display(),
      "prepared build"
    );

    Ok(Self {
      config,
      registry,
      graph,
      waves,
      toolchain,
      jobs,
    })
  }

  /// Packages the bundler has work for, sorted.
  pub fn bundled_packages(&self) -> Vec<String> {
    self
      .registry
      .iter()
      .filter(|p| p.capabilities.needs_bundle())
      .map(|p| p.name.clone())
      .collect()
  }
}

/// Transpile every package wave by wave, then bundle every bundled package.
///
/// Packages whose own transpile failed are not bundled.
pub async fn build_all(ctx: &Arc<BuildContext>) -> BuildReport {
  let start = Instant::now();
  let mut report = BuildReport::default();

  for (depth, wave) in ctx.waves.iter().enumerate() {
    info!(wave = depth, packages = wave.len(), "transpiling wave");
    report.merge(transpile_packages(ctx, wave).await);
  }

  let to_bundle: Vec<String> = ctx
    .bundled_packages()
    .into_iter()
    .filter(|name| !report.failed(name))
    .collect();
  info!(packages = to_bundle.len(), "bundling");
  report.merge(bundle_packages(ctx, &to_bundle).await);

  report.elapsed = start.elapsed();
  report
}

/// Package jobs in flight.
///
/// Task ids map back to package names, so a panicked job is still reported
/// against its package.
struct PackageTasks<T> {
  stage: Stage,
  set: JoinSet<Result<T, StageError>>,
  names: HashMap<task::Id, String>,
}

impl<T: Send + 'static> PackageTasks<T> {
  fn new(stage: Stage) -> Self {
    Self {
      stage,
      set: JoinSet::new(),
      names: HashMap::new(),
    }
  }

  fn spawn<F>(&mut self, package: String, job: F)
  where
    F: Future<Output = Result<T, StageError>> + Send + 'static,
  {
    let handle = self.set.spawn(job);
    self.names.insert(handle.id(), package);
  }

  /// The next finished job. A panic becomes [`StageError::Panicked`].
  async fn join_next(&mut self) -> Option<(String, Result<T, StageError>)> {
    let joined = self.set.join_next_with_id().await?;
    Some(match joined {
      Ok((id, result)) => (self.names.remove(&id).unwrap_or_default(), result),
      Err(e) => {
        let package = self.names.remove(&e.id()).unwrap_or_default();
        let error = StageError::Panicked {
          stage: self.stage,
          message: e.to_string(),
        };
        (package, Err(error))
      }
    })
  }
}

/// Transpile `names` concurrently. Packages with nothing to transpile are skipped.
pub async fn transpile_packages(ctx: &Arc<BuildContext>, names: &[String]) -> BuildReport {
  let mut tasks = PackageTasks::new(Stage::Transpile);

  for name in names {
    let Some(package) = ctx.registry.get(name) else { continue };
    if !package.capabilities.needs_transpile() {
      continue;
    }
    let package = package.clone();
    let ctx = Arc::clone(ctx);

    tasks.spawn(package.name.clone(), async move {
      let _permit = ctx.jobs.acquire().await.expect("job semaphore is never closed");
      Ok(transpile_package(&package, &ctx.config, &ctx.toolchain).await?)
    });
  }

  let mut report = BuildReport::default();
  while let Some((package, outcome)) = tasks.join_next().await {
    match outcome {
      Ok(result) => {
        info!(
          package = %result.package,
          scripts = result.scripts,
          stylesheets = result.stylesheets,
          elapsed_ms = result.elapsed.as_millis() as u64,
          "transpiled"
        );
        report.transpiled.push(result);
      }
      Err(error) => {
        error!(package = %package, error = %error, "transpile failed");
        report.failures.push(PackageFailure { package, error });
      }
    }
  }
  report
}

/// Bundle `names` concurrently.
pub async fn bundle_packages(ctx: &Arc<BuildContext>, names: &[String]) -> BuildReport {
  let mut tasks = PackageTasks::new(Stage::Bundle);

  for name in names {
    let Some(package) = ctx.registry.get(name) else { continue };
    if !package.capabilities.needs_bundle() {
      continue;
    }
    let package = package.clone();
    let ctx = Arc::clone(ctx);

    tasks.spawn(package.name.clone(), async move {
      let _permit = ctx.jobs.acquire().await.expect("job semaphore is never closed");
      Ok(bundle_package(&package, &ctx.registry, &ctx.config, &ctx.toolchain).await?)
    });
  }

  let mut report = BuildReport::default();
  while let Some((package, outcome)) = tasks.join_next().await {
    match outcome {
      Ok(result) => {
        info!(
          package = %result.package,
          outputs = result.outputs.len(),
          copied = result.copied,
          elapsed_ms = result.elapsed.as_millis() as u64,
          "bundled"
        );
        report.bundled.push(result);
      }
      Err(error) => {
        error!(package = %package, error = %error, "bundle failed");
        report.failures.push(PackageFailure { package, error });
      }
    }
  }
  report
}

/// Drain `queue`: rebuild pending packages in dependency order, then rebundle
/// the boundary packages downstream of them, until both queues are empty.
pub async fn drain_queue(ctx: &Arc<BuildContext>, queue: &mut RebuildQueue) -> BuildReport {
  let start = Instant::now();
  let mut report = BuildReport::default();

  while !queue.is_empty() {
    let pending = queue.take_pending();
    if !pending.is_empty() {
      info!(packages = ?pending, "rebuilding");
      let pending_set: HashSet<&str> = pending.iter().map(String::as_str).collect();
      let mut pass = BuildReport::default();

      for wave in &ctx.waves {
        let names: Vec<String> = wave
          .iter()
          .filter(|name| pending_set.contains(name.as_str()))
          .cloned()
          .collect();
        if !names.is_empty() {
          pass.merge(transpile_packages(ctx, &names).await);
        }
      }

      let to_bundle: Vec<String> = pending.iter().filter(|name| !pass.failed(name)).cloned().collect();
      pass.merge(bundle_packages(ctx, &to_bundle).await);

      for name in &pending {
        for target in ctx.graph.find_scripts_to_rebundle(name) {
          if !pending_set.contains(target.as_str()) {
            queue.push_rebundle(target);
          }
        }
      }
      report.merge(pass);
    }

    let rebundle = queue.take_rebundle();
    if !rebundle.is_empty() {
      info!(packages = ?rebundle, "rebundling downstream scripts");
      report.merge(bundle_packages(ctx, &rebundle).await);
    }
  }

  report.elapsed = start.elapsed();
  report
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
  use super::*;
  use crate::util::testutil::{test_config, write_package, write_script, write_source};

  /// `hooks` ← `data` (script) ← `edit-post` (script); `utils` is independent.
  fn workspace() -> (tempfile::TempDir, BuildConfig) {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(temp.path());
    let packages = config.packages_dir();

    write_package(&packages, "hooks", r#"{ "main": "build/index.js", "module": "build-module/index.js" }"#);
    write_source(&packages, "hooks", "src/index.js", "exports.addAction = () => {};\n");

    write_package(
      &packages,
      "data",
      r#"{ "main": "build/index.js", "wpScript": true, "dependencies": { "@wordpress/hooks": "*" } }"#,
    );
    write_source(&packages, "data", "src/index.js", "var hooks = require(\"@wordpress/hooks\");\nexports.select = 1;\n");

    write_package(
      &packages,
      "edit-post",
      r#"{ "main": "build/index.js", "wpScript": true, "dependencies": { "@wordpress/data": "*" } }"#,
    );
    write_source(&packages, "edit-post", "src/index.js", "var data = require(\"@wordpress/data\");\n");

    write_package(&packages, "utils", r#"{ "main": "build/index.js" }"#);
    write_source(&packages, "utils", "src/index.js", "exports.noop = () => {};\n");

    (temp, config)
  }

  #[tokio::test]
  async fn full_build_transpiles_and_bundles() {
    let (_temp, config) = workspace();
    let ctx = BuildContext::load(config).unwrap();
    assert_eq!(
      ctx.waves,
      vec![vec!["hooks".to_string(), "utils".to_string()], vec!["data".to_string()], vec!["edit-post".to_string()]]
    );

    let report = build_all(&ctx).await;
    assert!(report.is_success(), "failures: {:?}", report.failures);
    assert_eq!(report.transpiled.len(), 4);
    assert_eq!(report.bundled.len(), 2);

    let php = std::fs::read_to_string(ctx.config.script_output_dir("edit-post").join("index.min.asset.php")).unwrap();
    assert!(php.contains("array('wp-data')"));
    let data = std::fs::read_to_string(ctx.config.script_output_dir("data").join("index.js")).unwrap();
    assert!(data.contains("exports.addAction"));
  }

  #[tokio::test]
  async fn cycle_is_fatal_before_any_work() {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(temp.path());
    let packages = config.packages_dir();
    write_package(&packages, "a", r#"{ "dependencies": { "@wordpress/b": "*" } }"#);
    write_package(&packages, "b", r#"{ "dependencies": { "@wordpress/a": "*" } }"#);

    let err = BuildContext::load(config).unwrap_err();
    assert!(matches!(err, BuildError::Graph(GraphError::Cycle { .. })));
  }

  #[tokio::test]
  async fn failures_are_aggregated_per_package() {
    let (temp, mut config) = workspace();
    config.tools.esbuild = temp.path().join("picky-esbuild");
    write_script(
      &config.tools.esbuild,
      "input=$(cat)\ncase \"$input\" in *noop*) echo 'bad input' >&2; exit 1;; esac\nprintf '%s\\n' \"$input\"",
    );
    let ctx = BuildContext::load(config).unwrap();

    let report = build_all(&ctx).await;
    assert!(!report.is_success());
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].package, "utils");
    assert_eq!(report.failures[0].stage(), Stage::Transpile);
    assert_eq!(report.bundled.len(), 2);
  }

  fn linker_bug() -> Result<(), StageError> {
    panic!("linker bug")
  }

  #[tokio::test]
  async fn panicked_job_is_reported_against_its_package() {
    let mut tasks = PackageTasks::new(Stage::Bundle);
    tasks.spawn("edit-post".to_string(), async { linker_bug() });
    tasks.spawn("data".to_string(), async { Ok(()) });

    let mut outcomes = Vec::new();
    while let Some(outcome) = tasks.join_next().await {
      outcomes.push(outcome);
    }
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, "data");
    assert!(outcomes[0].1.is_ok());

    let (package, outcome) = outcomes.remove(1);
    let failure = PackageFailure {
      package,
      error: outcome.unwrap_err(),
    };
    assert_eq!(failure.package, "edit-post");
    assert_eq!(failure.stage(), Stage::Bundle);
    assert!(failure.error.to_string().contains("bundle task panicked"));
  }

  #[tokio::test]
  async fn rebuild_rebundles_downstream_scripts_only() {
    let (_temp, config) = workspace();
    let ctx = BuildContext::load(config).unwrap();
    assert!(build_all(&ctx).await.is_success());

    let mut queue = RebuildQueue::new();
    queue.push("hooks");
    let report = drain_queue(&ctx, &mut queue).await;

    assert!(report.is_success());
    assert!(queue.is_empty());
    let transpiled: Vec<&str> = report.transpiled.iter().map(|r| r.package.as_str()).collect();
    assert_eq!(transpiled, vec!["hooks"]);
    let bundled: Vec<&str> = report.bundled.iter().map(|r| r.package.as_str()).collect();
    assert_eq!(bundled, vec!["data"]);
  }
}
