//! PHP asset manifests.
//!
//! Every bundle gets an `<name>.min.asset.php` file the WordPress runtime
//! reads to enqueue the bundle after its dependencies:
//!
//! ```php
//! <?php return array('dependencies' => array('react', 'wp-data'), 'module_dependencies' => array(), 'version' => '1718000000000');
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// How a script module dependency is imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ImportKind {
  Static,
  Dynamic,
}

impl ImportKind {
  pub fn as_str(self) -> &'static str {
    match self {
      ImportKind::Static => "static",
      ImportKind::Dynamic => "dynamic",
    }
  }
}

/// Runtime dependencies touched during one bundle pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetManifest {
  /// Classic script handles.
  pub dependencies: BTreeSet<String>,
  /// Script module ids and how they are imported.
  pub module_dependencies: BTreeMap<String, ImportKind>,
}

impl AssetManifest {
  pub fn add_dependency(&mut self, handle: impl Into<String>) {
    self.dependencies.insert(handle.into());
  }

  /// Record a module import. A module imported both ways stays static.
  pub fn add_module_dependency(&mut self, id: impl Into<String>, kind: ImportKind) {
    self
      .module_dependencies
      .entry(id.into())
      .and_modify(|existing| *existing = (*existing).min(kind))
      .or_insert(kind);
  }

  /// Render the PHP file with the given version stamp.
  pub fn to_php(&self, version: &str) -> String {
    let dependencies = self
      .dependencies
      .iter()
      .map(|d| php_string(d))
      .collect::<Vec<_>>()
      .join(", ");
    let modules = self
      .module_dependencies
      .iter()
      .map(|(id, kind)| format!("array('id' => {}, 'import' => '{}')", php_string(id), kind.as_str()))
      .collect::<Vec<_>>()
      .join(", ");

    format!(
      "<?php return array('dependencies' => array({}), 'module_dependencies' => array({}), 'version' => {});\n",
      dependencies,
      modules,
      php_string(version)
    )
  }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn version_stamp() -> String {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_millis())
    .unwrap_or_default()
    .to_string()
}

fn php_string(value: &str) -> String {
  format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}
