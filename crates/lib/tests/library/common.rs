//! Shared fixtures for library integration tests.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use wpbuild_lib::config::{BuildConfig, ToolPaths};
use wpbuild_lib::orchestrate::BuildContext;

pub fn write(path: &Path, content: &str) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, content).unwrap();
}

pub fn read(path: &Path) -> String {
  std::fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {}: {}", path.display(), e))
}

pub fn write_script(path: &Path, body: &str) {
  write(path, &format!("#!/bin/sh\n{}\n", body));
  let mut perms = std::fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(path, perms).unwrap();
}

/// A repository with one package per `(name, package.json)` pair, plus
/// stand-in compilers: `esbuild` echoes its input and `sass` prints the entry.
pub struct Repo {
  pub temp: TempDir,
  pub config: BuildConfig,
}

impl Repo {
  pub fn new(packages: &[(&str, &str)]) -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    for (name, manifest) in packages {
      write(&root.join("packages").join(name).join("package.json"), manifest);
    }

    let tools = ToolPaths {
      esbuild: root.join(".tools/esbuild"),
      sass: root.join(".tools/sass"),
    };
    write_script(&tools.esbuild, "cat");
    write_script(&tools.sass, "for last; do :; done\ncat \"$last\"");

    let mut config = BuildConfig::new(root);
    config.tools = tools;
    config.parallelism = 4;
    Self { temp, config }
  }

  pub fn root(&self) -> &Path {
    self.temp.path()
  }

  pub fn package_path(&self, package: &str, relative: &str) -> std::path::PathBuf {
    self.root().join("packages").join(package).join(relative)
  }

  pub fn source(&self, package: &str, relative: &str, content: &str) {
    write(&self.package_path(package, relative), content);
  }

  pub fn context(&self) -> Arc<BuildContext> {
    BuildContext::load(self.config.clone()).unwrap()
  }
}

/// `hooks` (plain) ← `data` (script) ← `block-library` (script, copies PHP);
/// `interactivity` (script module) ← `router` (script module).
pub fn gutenberg_like() -> Repo {
  let repo = Repo::new(&[
    ("hooks", r#"{ "main": "build/index.js", "module": "build-module/index.js" }"#),
    (
      "data",
      r#"{ "main": "build/index.js", "module": "build-module/index.js", "wpScript": true,
           "dependencies": { "@wordpress/hooks": "*" } }"#,
    ),
    (
      "block-library",
      r#"{ "main": "build/index.js", "wpScript": true,
           "dependencies": { "@wordpress/data": "*", "react": "^18" },
           "wpCopyFiles": {
             "files": ["src/**/index.php"],
             "renameIndex": true,
             "transforms": [
               { "type": "prefix", "pattern": "render_block_", "value": "gutenberg_" },
               { "type": "actionPriority", "hook": "init", "priority": 20, "pluginOnly": true }
             ]
           } }"#,
    ),
    (
      "interactivity",
      r#"{ "main": "build/index.js", "module": "build-module/index.js",
           "wpScriptModuleExports": "./build-module/index.js" }"#,
    ),
    (
      "router",
      r#"{ "main": "build/index.js", "module": "build-module/index.js",
           "wpScriptModuleExports": { ".": "./build-module/index.js" },
           "dependencies": { "@wordpress/interactivity": "*" } }"#,
    ),
  ]);

  repo.source("hooks", "src/index.js", "exports.addAction = function () {};\n");
  repo.source(
    "data",
    "src/index.js",
    "var hooks = require(\"@wordpress/hooks\");\nexports.select = function () { return hooks; };\n",
  );
  repo.source("data", "src/store.json", "{ \"name\": \"core\" }\n");
  repo.source(
    "block-library",
    "src/index.js",
    "var data = require(\"@wordpress/data\");\nvar React = require(\"react\");\nexports.registerCoreBlocks = function () {};\n",
  );
  repo.source("block-library", "src/style.scss", ".wp-block { margin-left: 1em; }\n");
  repo.source("block-library", "src/_variables.scss", "$gap: 1em;\n");
  repo.source(
    "block-library",
    "src/paragraph/index.php",
    "<?php\nfunction render_block_core_paragraph() {}\nadd_action( 'init', 'register_block_core_paragraph' );\n",
  );
  repo.source("interactivity", "src/index.js", "exports.store = function () {};\n");
  repo.source(
    "router",
    "src/index.js",
    "var interactivity = require(\"@wordpress/interactivity\");\nexports.navigate = function () {};\n",
  );
  repo
}
