//! Test utilities for wpbuild-lib.
//!
//! Helpers for laying out package fixtures on disk, building in-memory
//! registries, and standing in for the external compilers with shell scripts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, ToolPaths};
use crate::package::{Package, PackageCapabilities, PackageJson, PackageRegistry};

/// Write `packages_dir/<name>/package.json`.
pub fn write_package(packages_dir: &Path, name: &str, manifest: &str) {
  let dir = packages_dir.join(name);
  std::fs::create_dir_all(&dir).unwrap();
  std::fs::write(dir.join("package.json"), manifest).unwrap();
}

/// Write a file relative to a package directory.
pub fn write_source(packages_dir: &Path, package: &str, relative: &str, content: &str) {
  let path = packages_dir.join(package).join(relative);
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, content).unwrap();
}

/// An in-memory package declaring `@wordpress/*` dependencies on `deps`.
pub fn package(name: &str, deps: &[&str], capabilities: PackageCapabilities) -> Package {
  let dependencies: BTreeMap<String, String> = deps
    .iter()
    .map(|d| (format!("@wordpress/{}", d), "*".to_string()))
    .collect();

  Package {
    name: name.to_string(),
    dir: PathBuf::from("/packages").join(name),
    manifest: Some(PackageJson {
      name: Some(format!("@wordpress/{}", name)),
      dependencies,
      ..PackageJson::default()
    }),
    capabilities,
  }
}

pub fn script_caps() -> PackageCapabilities {
  PackageCapabilities {
    commonjs: true,
    script: true,
    ..PackageCapabilities::default()
  }
}

pub fn plain_caps() -> PackageCapabilities {
  PackageCapabilities {
    commonjs: true,
    ..PackageCapabilities::default()
  }
}

/// Registry from `(name, deps, is_boundary)` triples.
pub fn registry(specs: &[(&str, &[&str], bool)]) -> PackageRegistry {
  PackageRegistry::from_packages(specs.iter().map(|(name, deps, boundary)| {
    let caps = if *boundary { script_caps() } else { plain_caps() };
    package(name, deps, caps)
  }))
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
  use std::os::unix::fs::PermissionsExt;

  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
  let mut perms = std::fs::metadata(path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(path, perms).unwrap();
}

/// Fake compilers: `esbuild` echoes stdin, `sass` prints its last argument's file.
#[cfg(unix)]
pub fn fake_tools(dir: &Path) -> ToolPaths {
  let esbuild = dir.join("bin").join("esbuild");
  let sass = dir.join("bin").join("sass");
  write_script(&esbuild, "cat");
  write_script(&sass, "for last; do :; done\ncat \"$last\"");
  ToolPaths { esbuild, sass }
}

/// A config rooted at `root` using the fake compilers.
#[cfg(unix)]
pub fn test_config(root: &Path) -> BuildConfig {
  let mut config = BuildConfig::new(root);
  config.tools = fake_tools(&root.join(".tools"));
  config.parallelism = 2;
  config
}
