//! Implementation of the `wpbuild` build command.
//!
//! Runs one full build of every package under `packages/` and, with
//! `--watch`, keeps rebuilding affected packages as their sources change.

use anyhow::{Context, Result};
use tracing::debug;

use wpbuild_lib::config::BuildConfig;
use wpbuild_lib::orchestrate::{BuildContext, BuildReport, build_all, watch};

use crate::output::{format_duration, print_error, print_info, print_stat, print_success};

/// Execute the build.
///
/// Returns `Ok(false)` when the build ran but some packages failed. A dependency
/// cycle or an unreadable packages directory is an error.
pub fn cmd_build(watch_mode: bool) -> Result<bool> {
  let cwd = std::env::current_dir().context("Failed to determine current directory")?;
  let config = BuildConfig::from_env(cwd);
  debug!(
    root = %config.root.display(),
    jobs = config.parallelism,
    plugin = config.mode.plugin,
    "resolved build configuration"
  );

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async move {
    let ctx = BuildContext::load(config).context("Failed to prepare build")?;
    let report = build_all(&ctx).await;
    print_report(&report);

    if watch_mode {
      print_info("Watching for changes (Ctrl+C to stop)");
      watch(ctx).await.context("Watch mode stopped")?;
    }

    Ok::<_, anyhow::Error>(report.is_success())
  })
}

fn print_report(report: &BuildReport) {
  println!();
  if report.is_success() {
    print_success(&format!("Build complete in {}", format_duration(report.elapsed)));
  } else {
    print_error(&format!(
      "Build failed for {} package(s) in {}",
      report.failures.len(),
      format_duration(report.elapsed)
    ));
  }
  print_stat("Packages transpiled", &report.transpiled.len().to_string());
  print_stat("Packages bundled", &report.bundled.len().to_string());

  for failure in &report.failures {
    print_error(&format!("{} ({}): {}", failure.package, failure.stage(), failure.error));
  }
}
