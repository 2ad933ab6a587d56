//! Full builds over a small monorepo.

use wpbuild_lib::orchestrate::{BuildContext, BuildError, Stage, build_all};

use super::common::{Repo, gutenberg_like, read, write_script};

#[tokio::test]
async fn full_build_writes_every_artifact() {
  let repo = gutenberg_like();
  let ctx = repo.context();

  let report = build_all(&ctx).await;
  assert!(report.is_success(), "failures: {:?}", report.failures);
  assert_eq!(report.transpiled.len(), 5);
  assert_eq!(report.bundled.len(), 4);

  // Per-package trees, both flavors where declared.
  assert!(repo.package_path("hooks", "build/index.js").exists());
  assert!(repo.package_path("hooks", "build-module/index.js").exists());
  assert!(repo.package_path("data", "build/store.json").exists());
  assert!(!repo.package_path("block-library", "build-module").exists());

  // Stylesheets, partials skipped.
  let ltr = read(&repo.package_path("block-library", "build-style/style.css"));
  let rtl = read(&repo.package_path("block-library", "build-style/style-rtl.css"));
  assert!(ltr.contains("margin-left"));
  assert!(rtl.contains("margin-right"));
  assert!(!repo.package_path("block-library", "build-style/_variables.css").exists());
}

#[tokio::test]
async fn script_bundles_inline_plain_siblings_and_reference_scripts() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  let scripts = repo.root().join("build/scripts");

  let data = read(&scripts.join("data/index.js"));
  assert!(data.contains("exports.addAction"), "hooks should be inlined into data");
  assert!(data.contains("window.wp.data = __wpbuild_require(0);"));
  let data_php = read(&scripts.join("data/index.min.asset.php"));
  assert!(data_php.starts_with("<?php return array('dependencies' => array(), "));

  let blocks = read(&scripts.join("block-library/index.js"));
  assert!(blocks.contains("window.wp.data"));
  assert!(blocks.contains("window.React"));
  assert!(!blocks.contains("exports.select"), "script siblings are never inlined");
  let blocks_php = read(&scripts.join("block-library/index.min.asset.php"));
  assert!(blocks_php.contains("'dependencies' => array('react', 'wp-data')"));
}

#[tokio::test]
async fn module_bundles_keep_sibling_modules_external() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  let modules = repo.root().join("build/modules");

  let interactivity = read(&modules.join("interactivity/index.js"));
  assert!(interactivity.contains("export const { store } = __wpbuild_entry;"));

  let router = read(&modules.join("router/index.js"));
  assert!(router.contains("from \"@wordpress/interactivity\""));
  assert!(!router.contains("exports.store"));
  let router_php = read(&modules.join("router/index.min.asset.php"));
  assert!(router_php.contains("array('id' => '@wordpress/interactivity', 'import' => 'static')"));
}

#[tokio::test]
async fn copy_rules_rename_and_transform_php() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  let php = read(&repo.root().join("build/scripts/block-library/paragraph.php"));
  assert!(php.contains("function gutenberg_render_block_core_paragraph()"));
  // Plugin-only transform, not a plugin build.
  assert!(php.contains("add_action( 'init', 'register_block_core_paragraph' );"));
}

#[tokio::test]
async fn plugin_build_applies_plugin_only_transforms_and_defines() {
  let mut repo = gutenberg_like();
  repo.config.mode.plugin = true;
  repo.source(
    "data",
    "src/index.js",
    "exports.plugin = globalThis.IS_GUTENBERG_PLUGIN;\n",
  );
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  let php = read(&repo.root().join("build/scripts/block-library/paragraph.php"));
  assert!(php.contains("add_action( 'init', 'register_block_core_paragraph', 20 )"));

  let data = read(&repo.root().join("build/scripts/data/index.js"));
  assert!(data.contains("exports.plugin = true;"));
}

#[tokio::test]
async fn failing_package_does_not_stop_others() {
  let repo = gutenberg_like();
  repo.source("interactivity", "src/broken.js", "BROKEN\n");
  write_script(
    &repo.config.tools.esbuild,
    "input=$(cat)\ncase \"$input\" in *BROKEN*) echo 'Expected \";\"' >&2; exit 1;; esac\nprintf '%s\\n' \"$input\"",
  );
  let ctx = repo.context();

  let report = build_all(&ctx).await;
  assert!(!report.is_success());
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].package, "interactivity");
  assert_eq!(report.failures[0].stage(), Stage::Transpile);

  // The failed package is not bundled; its dependents still are.
  assert!(!repo.root().join("build/modules/interactivity").exists());
  assert!(repo.root().join("build/modules/router/index.js").exists());
  assert!(repo.root().join("build/scripts/block-library/index.js").exists());
}

#[tokio::test]
async fn missing_sibling_output_fails_bundle_stage() {
  let repo = gutenberg_like();
  let ctx = repo.context();
  assert!(build_all(&ctx).await.is_success());

  std::fs::remove_dir_all(repo.package_path("hooks", "build")).unwrap();
  let report = wpbuild_lib::orchestrate::bundle_packages(&ctx, &["data".to_string()]).await;
  assert_eq!(report.failures.len(), 1);
  assert_eq!(report.failures[0].stage(), Stage::Bundle);
}

#[test]
fn cycle_is_rejected_before_work_starts() {
  let repo = Repo::new(&[
    ("a", r#"{ "main": "build/index.js", "dependencies": { "@wordpress/b": "*" } }"#),
    ("b", r#"{ "main": "build/index.js", "dependencies": { "@wordpress/a": "*" } }"#),
  ]);

  let err = BuildContext::load(repo.config.clone()).unwrap_err();
  assert!(matches!(err, BuildError::Graph(_)));
  assert!(err.to_string().contains("dependency cycle"));
  assert!(!repo.package_path("a", "build").exists());
}

#[tokio::test]
async fn malformed_manifest_package_is_skipped() {
  let repo = Repo::new(&[("broken", "{ not json"), ("ok", r#"{ "main": "build/index.js" }"#)]);
  repo.source("broken", "src/index.js", "exports.a = 1;\n");
  repo.source("ok", "src/index.js", "exports.b = 1;\n");
  let ctx = repo.context();

  let report = build_all(&ctx).await;
  assert!(report.is_success());
  assert_eq!(report.transpiled.len(), 1);
  assert!(!repo.package_path("broken", "build").exists());
}
