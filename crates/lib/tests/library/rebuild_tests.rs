//! Watch-mode rebuilds through the rebuild queue.

use wpbuild_lib::orchestrate::watch::package_for_change;
use wpbuild_lib::orchestrate::{RebuildQueue, build_all, drain_queue};

use super::common::{gutenberg_like, read};

#[tokio::test]
async fn change_in_plain_package_rebundles_downstream_scripts() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  repo.source("hooks", "src/index.js", "exports.addFilter = function () {};\n");
  let changed = repo.package_path("hooks", "src/index.js");
  let package = package_for_change(&ctx.registry, &changed).unwrap();
  assert_eq!(package, "hooks");

  let mut queue = RebuildQueue::new();
  queue.push(package);
  let report = drain_queue(&ctx, &mut queue).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);
  assert!(queue.is_empty());

  let transpiled: Vec<&str> = report.transpiled.iter().map(|r| r.package.as_str()).collect();
  assert_eq!(transpiled, vec!["hooks"]);
  let bundled: Vec<&str> = report.bundled.iter().map(|r| r.package.as_str()).collect();
  assert_eq!(bundled, vec!["data"], "propagation stops at the first script");

  let data = read(&repo.root().join("build/scripts/data/index.js"));
  assert!(data.contains("exports.addFilter"));
}

#[tokio::test]
async fn change_in_script_package_rebuilds_only_itself() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  let mut queue = RebuildQueue::new();
  queue.push("interactivity");
  let report = drain_queue(&ctx, &mut queue).await;

  assert!(report.is_success());
  assert_eq!(report.transpiled.len(), 1);
  assert_eq!(report.bundled.len(), 1);
  assert_eq!(report.bundled[0].package, "interactivity");
}

#[test]
fn build_outputs_never_trigger_rebuilds() {
  let repo = gutenberg_like();
  let ctx = repo.context();

  assert_eq!(package_for_change(&ctx.registry, &repo.package_path("data", "build/index.js")), None);
  assert_eq!(
    package_for_change(&ctx.registry, &repo.package_path("data", "src/test/store.js")),
    None
  );
  assert_eq!(
    package_for_change(&ctx.registry, &repo.package_path("block-library", "src/style.scss")),
    Some("block-library")
  );
}
