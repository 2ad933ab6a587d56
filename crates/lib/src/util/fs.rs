//! File discovery helpers shared by the registry, transpiler and bundler.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;
use wax::{CandidatePath, Glob, Pattern};

/// Directory names never treated as buildable source.
const EXCLUDED_DIRS: &[&str] = &["test", "__tests__", "__mocks__", "stories", "benchmark", "node_modules"];

/// File-name infixes marking test, story or platform-specific sources.
const EXCLUDED_INFIXES: &[&str] = &[".test.", ".spec.", ".story.", ".stories.", ".native.", ".ios.", ".android."];

/// Render a relative path with forward slashes for glob matching and output.
pub fn to_forward_slashes(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

/// Match a relative path against a glob pattern.
pub fn matches_glob(pattern: &str, relative: &Path) -> bool {
  let normalized = to_forward_slashes(relative);
  match Glob::new(pattern) {
    Ok(glob) => glob.matched(&CandidatePath::from(normalized.as_str())).is_some(),
    Err(_) => pattern == normalized,
  }
}

/// Whether a `src/`-relative path belongs to tests, stories or benchmarks.
pub fn is_excluded_source(relative: &Path) -> bool {
  let mut components = relative.components().peekable();
  while let Some(component) = components.next() {
    let name = component.as_os_str().to_string_lossy();
    if components.peek().is_some() {
      if EXCLUDED_DIRS.contains(&name.as_ref()) {
        return true;
      }
    } else if EXCLUDED_INFIXES.iter().any(|infix| name.contains(infix)) || name.ends_with(".d.ts") {
      return true;
    }
  }
  false
}

/// List every regular file below `dir`, relative to `dir`, sorted.
///
/// A missing directory yields an empty list.
pub fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
  if !dir.is_dir() {
    return Ok(Vec::new());
  }

  let mut files = Vec::new();
  for entry in WalkDir::new(dir).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    if !entry.file_type().is_file() {
      continue;
    }
    if let Ok(relative) = entry.path().strip_prefix(dir) {
      files.push(relative.to_path_buf());
    }
  }
  Ok(files)
}

/// Write `contents` to `path`, creating parent directories.
pub async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
  if let Some(parent) = path.parent() {
    tokio::fs::create_dir_all(parent).await?;
  }
  tokio::fs::write(path, contents).await
}
