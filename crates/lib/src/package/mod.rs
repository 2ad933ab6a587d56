//! Package registry.
//!
//! Enumerates `packages/<name>/` directories, loads each `package.json` once and
//! derives a typed [`PackageCapabilities`] record per package. The registry is an
//! owned value handed to the graph, transpiler, bundler and orchestrator; nothing
//! is cached globally, so independent builds never share state.

mod types;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::consts::{DEFAULT_STYLE_ENTRY_GLOB, PACKAGE_SCOPE, SOURCE_DIR};
use crate::util::fs::{is_excluded_source, matches_glob, walk_files};

pub use types::{
  CopyRule, OneOrMany, Package, PackageCapabilities, PackageError, PackageJson, ScriptModuleExports, TextTransform,
};

impl Package {
  /// Load a package from its directory.
  ///
  /// A missing or malformed `package.json` is logged and the package is kept
  /// with no manifest and no capabilities.
  pub fn load(dir: &Path) -> Result<Self, PackageError> {
    let name = dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();

    let manifest = read_manifest(&name, dir);
    let capabilities = match &manifest {
      Some(manifest) => derive_capabilities(&name, dir, manifest)?,
      None => PackageCapabilities::default(),
    };

    Ok(Self {
      name,
      dir: dir.to_path_buf(),
      manifest,
      capabilities,
    })
  }

  pub fn src_dir(&self) -> PathBuf {
    self.dir.join(SOURCE_DIR)
  }
}

fn read_manifest(name: &str, dir: &Path) -> Option<PackageJson> {
  let path = dir.join("package.json");
  let content = match std::fs::read_to_string(&path) {
    Ok(content) => content,
    Err(e) => {
      warn!(package = %name, error = %e, "package.json unreadable, package has no build capabilities");
      return None;
    }
  };

  match serde_json::from_str(&content) {
    Ok(manifest) => Some(manifest),
    Err(e) => {
      warn!(package = %name, error = %e, "package.json malformed, package has no build capabilities");
      None
    }
  }
}

fn derive_capabilities(name: &str, dir: &Path, manifest: &PackageJson) -> Result<PackageCapabilities, PackageError> {
  let src_files = walk_files(&dir.join(SOURCE_DIR)).map_err(|source| PackageError::ListFiles {
    package: name.to_string(),
    source,
  })?;

  let style_globs = manifest
    .wp_style_entry_points
    .clone()
    .map(OneOrMany::into_vec)
    .unwrap_or_else(|| vec![DEFAULT_STYLE_ENTRY_GLOB.to_string()]);

  let style_entries = src_files
    .iter()
    .filter(|rel| rel.extension().is_some_and(|ext| ext == "scss"))
    .filter(|rel| !rel.file_name().is_some_and(|f| f.to_string_lossy().starts_with('_')))
    .map(|rel| Path::new(SOURCE_DIR).join(rel))
    .filter(|rel| style_globs.iter().any(|glob| matches_glob(glob, rel)))
    .collect();

  let css_modules = src_files
    .iter()
    .filter(|rel| rel.to_string_lossy().ends_with(".module.css"))
    .filter(|rel| !is_excluded_source(rel))
    .cloned()
    .collect();

  let capabilities = PackageCapabilities {
    commonjs: manifest.main.is_some(),
    esmodule: manifest.module.is_some(),
    script: manifest.wp_script,
    script_module_exports: manifest
      .wp_script_module_exports
      .clone()
      .map(ScriptModuleExports::into_map)
      .unwrap_or_default(),
    style_entries,
    css_modules,
    copy: manifest.wp_copy_files.clone(),
  };

  debug!(package = %name, ?capabilities, "derived package capabilities");
  Ok(capabilities)
}

/// The set of packages taking part in one build invocation.
#[derive(Debug, Clone, Default)]
pub struct PackageRegistry {
  packages: BTreeMap<String, Package>,
}

impl PackageRegistry {
  /// Scan `packages_dir` for package directories.
  ///
  /// Hidden directories are skipped. Every package is loaded exactly once.
  pub fn scan(packages_dir: &Path) -> Result<Self, PackageError> {
    let entries = std::fs::read_dir(packages_dir).map_err(|source| PackageError::ReadDir {
      path: packages_dir.to_path_buf(),
      source,
    })?;

    let mut packages = Vec::new();
    for entry in entries {
      let entry = entry.map_err(|source| PackageError::ReadDir {
        path: packages_dir.to_path_buf(),
        source,
      })?;
      let path = entry.path();
      let hidden = entry.file_name().to_string_lossy().starts_with('.');
      if path.is_dir() && !hidden {
        packages.push(Package::load(&path)?);
      }
    }

    debug!(count = packages.len(), dir = %packages_dir.display(), "scanned packages");
    Ok(Self::from_packages(packages))
  }

  pub fn from_packages(packages: impl IntoIterator<Item = Package>) -> Self {
    Self {
      packages: packages.into_iter().map(|p| (p.name.clone(), p)).collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&Package> {
    self.packages.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.packages.contains_key(name)
  }

  /// Package names in sorted order.
  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.packages.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Package> {
    self.packages.values()
  }

  pub fn len(&self) -> usize {
    self.packages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  /// Sibling packages named in `name`'s declared dependencies.
  ///
  /// Only `@wordpress/<dir>` entries whose `<dir>` is in this registry count.
  /// Sorted and deduplicated.
  pub fn wordpress_dependencies(&self, name: &str) -> Vec<String> {
    let Some(package) = self.get(name) else {
      return Vec::new();
    };

    let mut deps: Vec<String> = package
      .declared_dependencies()
      .filter_map(|dep| dep.strip_prefix(PACKAGE_SCOPE))
      .filter(|dep| *dep != name && self.contains(dep))
      .map(str::to_string)
      .collect();
    deps.sort();
    deps.dedup();
    deps
  }

  /// Map a `@wordpress/...` import specifier to the sibling it names, if any.
  ///
  /// Returns the package and the subpath after the package name (empty for the root).
  pub fn sibling_for_specifier<'a>(&self, specifier: &'a str) -> Option<(&Package, &'a str)> {
    let rest = specifier.strip_prefix(PACKAGE_SCOPE)?;
    let (name, subpath) = match rest.split_once('/') {
      Some((name, subpath)) => (name, subpath),
      None => (rest, ""),
    };
    self.get(name).map(|p| (p, subpath))
  }

  /// Which package directory, if any, contains `path`.
  pub fn owner_of(&self, path: &Path) -> Option<&Package> {
    self.iter().find(|p| path.starts_with(&p.dir))
  }
}
