//! Package manifest and capability types.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while scanning the package registry.
///
/// Individual unreadable manifests are not errors (see [`PackageRegistry`](super::PackageRegistry));
/// only a missing or unreadable packages directory is.
#[derive(Debug, Error)]
pub enum PackageError {
  #[error("failed to read packages directory {path}: {source}")]
  ReadDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to list files of package {package}: {source}")]
  ListFiles {
    package: String,
    #[source]
    source: std::io::Error,
  },
}

/// `wpScriptModuleExports`: a single entry file or a map of export path to file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptModuleExports {
  Single(String),
  Map(BTreeMap<String, String>),
}

impl ScriptModuleExports {
  /// Normalize to an export-path → file map; a bare string is the `"."` export.
  pub fn into_map(self) -> BTreeMap<String, String> {
    match self {
      ScriptModuleExports::Single(file) => BTreeMap::from([(".".to_string(), file)]),
      ScriptModuleExports::Map(map) => map,
    }
  }
}

/// A field accepting either one string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

impl OneOrMany {
  pub fn into_vec(self) -> Vec<String> {
    match self {
      OneOrMany::One(s) => vec![s],
      OneOrMany::Many(v) => v,
    }
  }
}

/// A text substitution applied to copied PHP files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TextTransform {
  /// Prepend `value` to every identifier matching the regex `pattern`.
  Prefix {
    pattern: String,
    value: String,
    #[serde(default)]
    plugin_only: bool,
  },
  /// Append `value` to every identifier matching the regex `pattern`.
  Suffix {
    pattern: String,
    value: String,
    #[serde(default)]
    plugin_only: bool,
  },
  /// Add a priority argument to `add_action( '<hook>', '<callback>' )` calls.
  ActionPriority {
    hook: String,
    priority: i64,
    #[serde(default)]
    plugin_only: bool,
  },
}

impl TextTransform {
  pub fn plugin_only(&self) -> bool {
    match self {
      TextTransform::Prefix { plugin_only, .. }
      | TextTransform::Suffix { plugin_only, .. }
      | TextTransform::ActionPriority { plugin_only, .. } => *plugin_only,
    }
  }
}

/// `wpCopyFiles`: auxiliary files copied next to the bundled script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyRule {
  /// Globs relative to the package root.
  pub files: Vec<String>,
  /// Flatten `<dir>/index.php` into `<dir>.php`.
  #[serde(default)]
  pub rename_index: bool,
  /// Applied in order to every copied `.php` file.
  #[serde(default)]
  pub transforms: Vec<TextTransform>,
}

/// The subset of `package.json` the pipeline reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageJson {
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub main: Option<String>,
  #[serde(default)]
  pub module: Option<String>,
  #[serde(default)]
  pub dependencies: BTreeMap<String, String>,
  #[serde(default)]
  pub wp_script: bool,
  #[serde(default)]
  pub wp_script_module_exports: Option<ScriptModuleExports>,
  #[serde(default)]
  pub wp_style_entry_points: Option<OneOrMany>,
  #[serde(default)]
  pub wp_copy_files: Option<CopyRule>,
}

/// Build capabilities of a package, derived once when it is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCapabilities {
  /// `main` is set: emit the CommonJS tree into `build/`.
  pub commonjs: bool,
  /// `module` is set: emit the ES module tree into `build-module/`.
  pub esmodule: bool,
  /// `wpScript`: bundle a classic script exposed on `window.wp`.
  pub script: bool,
  /// `wpScriptModuleExports`, normalized to export path → entry file.
  pub script_module_exports: BTreeMap<String, String>,
  /// SCSS entry points, relative to the package root.
  pub style_entries: Vec<PathBuf>,
  /// `*.module.css` files, relative to `src/`.
  pub css_modules: Vec<PathBuf>,
  pub copy: Option<CopyRule>,
}

impl PackageCapabilities {
  /// Whether the package owns a bundling step (script or script module).
  ///
  /// Rebuild propagation stops at boundary packages.
  pub fn is_boundary(&self) -> bool {
    self.script || self.is_script_module()
  }

  pub fn is_script_module(&self) -> bool {
    !self.script_module_exports.is_empty()
  }

  /// Whether the bundler has anything to do for this package.
  pub fn needs_bundle(&self) -> bool {
    self.is_boundary() || self.copy.is_some()
  }

  pub fn has_styles(&self) -> bool {
    !self.style_entries.is_empty() || !self.css_modules.is_empty()
  }

  pub fn needs_transpile(&self) -> bool {
    self.commonjs || self.esmodule || self.has_styles()
  }
}

/// A package of the monorepo, identified by its directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
  pub name: String,
  pub dir: PathBuf,
  /// `None` when `package.json` is missing or malformed.
  pub manifest: Option<PackageJson>,
  pub capabilities: PackageCapabilities,
}

impl Package {
  pub fn manifest(&self) -> Option<&PackageJson> {
    self.manifest.as_ref()
  }

  /// Declared dependency names, empty when the manifest is absent.
  pub fn declared_dependencies(&self) -> impl Iterator<Item = &str> {
    self
      .manifest
      .iter()
      .flat_map(|m| m.dependencies.keys())
      .map(String::as_str)
  }

  /// The `main` entry relative to the package root.
  pub fn main_entry(&self) -> Option<&str> {
    self.manifest.as_ref().and_then(|m| m.main.as_deref())
  }
}
