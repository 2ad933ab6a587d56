//! Per-package transpilation.
//!
//! Turns a package's `src/` tree into the `build/` (CommonJS) and
//! `build-module/` (ES module) trees and compiles its stylesheets into
//! `build-style/`. Every file is an independent task; the two module flavors
//! and the stylesheets all run concurrently.

pub mod css;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::BuildConfig;
use crate::consts::{BUILD_DIR, BUILD_MODULE_DIR, BUILD_STYLE_DIR, CSS_MODULES_STYLESHEET, SOURCE_DIR};
use crate::package::Package;
use crate::toolchain::{Loader, ModuleFormat, ToolError, Toolchain};
use crate::util::fs::{is_excluded_source, to_forward_slashes, walk_files, write_file};

#[derive(Debug, Error)]
pub enum TranspileError {
  #[error("failed to list sources of {package}: {source}")]
  ListFiles {
    package: String,
    #[source]
    source: std::io::Error,
  },

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

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error("transpile task of {package} did not complete: {source}")]
  Task {
    package: String,
    #[source]
    source: tokio::task::JoinError,
  },
}

/// Summary of one package's transpile, used for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranspileResult {
  pub package: String,
  /// Script files written, counted once per module flavor.
  pub scripts: usize,
  /// JSON files copied, counted once per module flavor.
  pub json: usize,
  /// Stylesheets written to `build-style/`.
  pub stylesheets: usize,
  pub elapsed: Duration,
}

/// Output tree for a module flavor, relative to the package directory.
pub fn flavor_dir(format: ModuleFormat) -> &'static str {
  match format {
    ModuleFormat::CommonJs => BUILD_DIR,
    ModuleFormat::Esm => BUILD_MODULE_DIR,
  }
}

/// Output path of a `src/`-relative script: same layout, `.js` extension.
pub fn script_output_path(relative: &Path) -> PathBuf {
  relative.with_extension("js")
}

/// Transpile one package.
///
/// The first failing file aborts the remaining work of this package. Files
/// already written are left in place.
pub async fn transpile_package(
  package: &Package,
  config: &BuildConfig,
  toolchain: &Toolchain,
) -> Result<TranspileResult, TranspileError> {
  let start = Instant::now();
  let caps = &package.capabilities;
  let src = package.src_dir();

  let files = walk_files(&src).map_err(|source| TranspileError::ListFiles {
    package: package.name.clone(),
    source,
  })?;
  let sources: Vec<&PathBuf> = files.iter().filter(|rel| !is_excluded_source(rel)).collect();
  let scripts: Vec<&PathBuf> = sources
    .iter()
    .copied()
    .filter(|rel| Loader::from_path(rel).is_some())
    .collect();
  let json: Vec<&PathBuf> = sources
    .iter()
    .copied()
    .filter(|rel| rel.extension().is_some_and(|ext| ext == "json"))
    .collect();

  let mut flavors = Vec::new();
  if caps.commonjs {
    flavors.push(ModuleFormat::CommonJs);
  }
  if caps.esmodule {
    flavors.push(ModuleFormat::Esm);
  }

  let mut tasks: JoinSet<Result<(), TranspileError>> = JoinSet::new();

  for &format in &flavors {
    let out_dir = package.dir.join(flavor_dir(format));

    for rel in &scripts {
      let toolchain = toolchain.clone();
      let source = src.join(rel);
      let output = out_dir.join(script_output_path(rel));
      tasks.spawn(async move { transpile_script(&toolchain, &source, &output, format).await });
    }

    for rel in &json {
      let source = src.join(rel);
      let output = out_dir.join(rel);
      tasks.spawn(async move { copy_file(&source, &output).await });
    }
  }

  let load_paths = vec![src.clone(), config.packages_dir(), config.root.join("node_modules")];
  for entry in &caps.style_entries {
    let toolchain = toolchain.clone();
    let source = package.dir.join(entry);
    let stem = style_output_stem(entry);
    let style_dir = package.dir.join(BUILD_STYLE_DIR);
    let load_paths = load_paths.clone();
    tasks.spawn(async move { compile_style_entry(&toolchain, &source, &style_dir, &stem, &load_paths).await });
  }

  if !caps.css_modules.is_empty() {
    let name = package.name.clone();
    let dir = package.dir.clone();
    let modules = caps.css_modules.clone();
    let flavors = flavors.clone();
    tasks.spawn(async move { emit_css_modules(&name, &dir, &modules, &flavors).await });
  }

  while let Some(joined) = tasks.join_next().await {
    let result = joined.map_err(|source| TranspileError::Task {
      package: package.name.clone(),
      source,
    })?;
    if let Err(e) = result {
      tasks.abort_all();
      return Err(e);
    }
  }

  let stylesheets =
    caps.style_entries.len() * 2 + usize::from(!caps.css_modules.is_empty());
  let result = TranspileResult {
    package: package.name.clone(),
    scripts: scripts.len() * flavors.len(),
    json: json.len() * flavors.len(),
    stylesheets,
    elapsed: start.elapsed(),
  };
  debug!(package = %package.name, ?result, "transpile finished");
  Ok(result)
}

async fn read_source(path: &Path) -> Result<String, TranspileError> {
  tokio::fs::read_to_string(path).await.map_err(|source| TranspileError::Read {
    path: path.to_path_buf(),
    source,
  })
}

async fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), TranspileError> {
  write_file(path, contents).await.map_err(|source| TranspileError::Write {
    path: path.to_path_buf(),
    source,
  })
}

async fn transpile_script(
  toolchain: &Toolchain,
  source: &Path,
  output: &Path,
  format: ModuleFormat,
) -> Result<(), TranspileError> {
  let Some(loader) = Loader::from_path(source) else {
    return Ok(());
  };
  let code = read_source(source).await?;
  let compiled = toolchain.transform(&code, loader, format, source).await?;
  write_output(output, compiled).await
}

async fn copy_file(source: &Path, output: &Path) -> Result<(), TranspileError> {
  let contents = tokio::fs::read(source).await.map_err(|e| TranspileError::Read {
    path: source.to_path_buf(),
    source: e,
  })?;
  write_output(output, contents).await
}

/// `src/nested/editor.scss` → `nested/editor`.
fn style_output_stem(entry: &Path) -> String {
  let relative = entry.strip_prefix(SOURCE_DIR).unwrap_or(entry);
  to_forward_slashes(&relative.with_extension(""))
}

async fn compile_style_entry(
  toolchain: &Toolchain,
  source: &Path,
  style_dir: &Path,
  stem: &str,
  load_paths: &[PathBuf],
) -> Result<(), TranspileError> {
  let compiled = toolchain.compile_scss(source, load_paths).await?;
  let ltr = css::add_vendor_prefixes(&compiled);
  let rtl = css::mirror_rtl(&ltr);

  write_output(&style_dir.join(format!("{}.css", stem)), ltr).await?;
  write_output(&style_dir.join(format!("{}-rtl.css", stem)), rtl).await
}

/// Scope every CSS module, write its class map into each enabled module tree
/// and the combined stylesheet into `build-style/`.
async fn emit_css_modules(
  package: &str,
  dir: &Path,
  modules: &[PathBuf],
  flavors: &[ModuleFormat],
) -> Result<(), TranspileError> {
  let src = dir.join(SOURCE_DIR);
  let mut combined = String::new();

  for rel in modules {
    let css = read_source(&src.join(rel)).await?;
    let rel_name = to_forward_slashes(rel);
    let scoped = css::scope_css_module(&css, package, &rel_name);

    for &format in flavors {
      let module = match format {
        ModuleFormat::CommonJs => scoped.commonjs_module(),
        ModuleFormat::Esm => scoped.esm_module(),
      };
      let output = dir.join(flavor_dir(format)).join(format!("{}.js", rel_name));
      write_output(&output, module).await?;
    }

    if !combined.is_empty() {
      combined.push('\n');
    }
    combined.push_str(&format!("/* {} */\n", rel_name));
    combined.push_str(scoped.css.trim_end());
    combined.push('\n');
  }

  let output = dir.join(BUILD_STYLE_DIR).join(CSS_MODULES_STYLESHEET);
  write_output(&output, css::add_vendor_prefixes(&combined)).await
}
