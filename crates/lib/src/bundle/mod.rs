//! Browser bundles for boundary packages.
//!
//! A classic script package gets one iife bundle exposed on `window.wp`; a
//! script module package gets one ES module bundle per declared export. Each
//! bundle is written unminified and minified, followed by its PHP asset
//! manifest once both succeeded. `wpCopyFiles` rules run in the same pass.

pub mod copy;
pub mod linker;
pub mod manifest;
pub mod rules;
pub mod scan;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::config::BuildConfig;
use crate::package::{Package, PackageRegistry};
use crate::toolchain::{ModuleFormat, ToolError, Toolchain};
use crate::util::fs::write_file;

pub use linker::{LinkedBundle, Linker};
pub use manifest::{AssetManifest, ImportKind};
pub use rules::{BundleFormat, ResolveRules};

#[derive(Debug, Error)]
pub enum BundleError {
  #[error("bundle entry {path} does not exist; was the package transpiled?")]
  MissingEntry { path: PathBuf },

  #[error("cannot resolve '{specifier}' imported from {importer}")]
  Unresolved { specifier: String, importer: PathBuf },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to list files of {package}: {source}")]
  ListFiles {
    package: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Scan {
    path: PathBuf,
    #[source]
    source: scan::ScanError,
  },

  #[error("invalid copy transform pattern '{pattern}': {source}")]
  InvalidPattern {
    pattern: String,
    #[source]
    source: regex::Error,
  },

  #[error(transparent)]
  Tool(#[from] ToolError),
}

/// Summary of one package's bundle pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResult {
  pub package: String,
  /// Bundles, minified bundles and manifests written.
  pub outputs: Vec<PathBuf>,
  /// Files written by copy rules.
  pub copied: usize,
  pub elapsed: Duration,
}

impl BundleFormat {
  fn minify_format(self) -> ModuleFormat {
    match self {
      BundleFormat::Iife => ModuleFormat::CommonJs,
      BundleFormat::Esm => ModuleFormat::Esm,
    }
  }
}

/// Output file name of a script module export: `"."` → `index`, `"./debug"` → `debug`.
pub fn export_file_stem(export: &str) -> String {
  match export.trim_start_matches("./").trim_start_matches('.') {
    "" => "index".to_string(),
    stem => stem.trim_end_matches(".js").to_string(),
  }
}

/// Bundle one package and run its copy rules.
pub async fn bundle_package(
  package: &Package,
  registry: &PackageRegistry,
  config: &BuildConfig,
  toolchain: &Toolchain,
) -> Result<BundleResult, BundleError> {
  let start = Instant::now();
  let caps = &package.capabilities;
  let rules = ResolveRules::new(registry, &package.name);
  let defines = config.mode.defines();
  let global = rules::camel_case(&package.name);
  let mut outputs = Vec::new();

  if caps.script {
    let entry = package
      .dir
      .join(linker::compiled_entry(package.main_entry().unwrap_or("build/index.js")));
    let linked = Linker::new(&rules, BundleFormat::Iife, &defines).link(&entry, &global).await?;
    let written = emit_bundle(
      toolchain,
      linked,
      BundleFormat::Iife,
      &config.script_output_dir(&package.name),
      "index",
    )
    .await?;
    outputs.extend(written);
  }

  for (export, file) in &caps.script_module_exports {
    let entry = package.dir.join(linker::compiled_entry(file));
    let linked = Linker::new(&rules, BundleFormat::Esm, &defines).link(&entry, &global).await?;
    let written = emit_bundle(
      toolchain,
      linked,
      BundleFormat::Esm,
      &config.module_output_dir(&package.name),
      &export_file_stem(export),
    )
    .await?;
    outputs.extend(written);
  }

  let copied = match &caps.copy {
    Some(rule) => {
      copy::copy_files(package, rule, &config.script_output_dir(&package.name), config.mode)
        .await?
        .len()
    }
    None => 0,
  };

  let result = BundleResult {
    package: package.name.clone(),
    outputs,
    copied,
    elapsed: start.elapsed(),
  };
  debug!(package = %package.name, outputs = result.outputs.len(), copied, "bundle finished");
  Ok(result)
}

/// Minify and write one linked bundle plus its manifest.
async fn emit_bundle(
  toolchain: &Toolchain,
  linked: LinkedBundle,
  format: BundleFormat,
  out_dir: &Path,
  stem: &str,
) -> Result<Vec<PathBuf>, BundleError> {
  let plain = out_dir.join(format!("{}.js", stem));
  let minified_path = out_dir.join(format!("{}.min.js", stem));
  let manifest_path = out_dir.join(format!("{}.min.asset.php", stem));

  let minified = toolchain
    .minify(&linked.code, format.minify_format(), &plain.display().to_string())
    .await?;

  write(&plain, &linked.code).await?;
  write(&minified_path, &minified).await?;
  let php = linked.manifest.to_php(&manifest::version_stamp());
  write(&manifest_path, &php).await?;

  debug!(bundle = %plain.display(), modules = linked.files.len(), "wrote bundle");
  Ok(vec![plain, minified_path, manifest_path])
}

async fn write(path: &Path, contents: &str) -> Result<(), BundleError> {
  write_file(path, contents).await.map_err(|source| BundleError::Write {
    path: path.to_path_buf(),
    source,
  })
}
