//! `wpCopyFiles`: auxiliary files copied next to a bundled script.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use super::BundleError;
use crate::config::BuildMode;
use crate::consts::SOURCE_DIR;
use crate::package::{CopyRule, Package, TextTransform};
use crate::util::fs::{matches_glob, walk_files, write_file};

/// A transform with its pattern compiled.
enum CompiledTransform {
  Prefix { pattern: Regex, value: String },
  Suffix { pattern: Regex, value: String },
  ActionPriority { pattern: Regex, hook: String, priority: i64 },
}

impl CompiledTransform {
  fn compile(transform: &TextTransform) -> Result<Self, BundleError> {
    let regex = |pattern: String| {
      Regex::new(&pattern).map_err(|source| BundleError::InvalidPattern { pattern, source })
    };

    Ok(match transform {
      TextTransform::Prefix { pattern, value, .. } => CompiledTransform::Prefix {
        pattern: regex(identifier_pattern(pattern))?,
        value: value.clone(),
      },
      TextTransform::Suffix { pattern, value, .. } => CompiledTransform::Suffix {
        pattern: regex(identifier_pattern(pattern))?,
        value: value.clone(),
      },
      TextTransform::ActionPriority { hook, priority, .. } => CompiledTransform::ActionPriority {
        pattern: regex(format!(
          r#"add_action\(\s*['"]{}['"]\s*,\s*['"]([^'"]+)['"]\s*\)"#,
          regex::escape(hook)
        ))?,
        hook: hook.clone(),
        priority: *priority,
      },
    })
  }

  fn apply(&self, text: &str) -> String {
    match self {
      CompiledTransform::Prefix { pattern, value } => pattern
        .replace_all(text, |caps: &regex::Captures<'_>| format!("{}{}", value, &caps[0]))
        .into_owned(),
      CompiledTransform::Suffix { pattern, value } => pattern
        .replace_all(text, |caps: &regex::Captures<'_>| format!("{}{}", &caps[0], value))
        .into_owned(),
      CompiledTransform::ActionPriority { pattern, hook, priority } => pattern
        .replace_all(text, |caps: &regex::Captures<'_>| {
          format!("add_action( '{}', '{}', {} )", hook, &caps[1], priority)
        })
        .into_owned(),
    }
  }
}

/// Whole identifiers starting with a match of `pattern`.
fn identifier_pattern(pattern: &str) -> String {
  format!(r"\b(?:{})\w*", pattern)
}

/// Output path for a `src/`-relative file.
///
/// With `rename_index`, `<dir>/index.php` becomes `<dir>.php`.
pub fn copy_destination(relative: &Path, rename_index: bool) -> PathBuf {
  if rename_index
    && relative.file_name().is_some_and(|name| name == "index.php")
    && let Some(parent) = relative.parent()
    && parent.file_name().is_some()
  {
    return parent.with_extension("php");
  }
  relative.to_path_buf()
}

/// Copy the files matched by `rule` into `out_dir`, applying text transforms to
/// PHP files. Transforms marked plugin-only are skipped outside plugin builds.
pub async fn copy_files(
  package: &Package,
  rule: &CopyRule,
  out_dir: &Path,
  mode: BuildMode,
) -> Result<Vec<PathBuf>, BundleError> {
  let transforms = rule
    .transforms
    .iter()
    .filter(|t| mode.plugin || !t.plugin_only())
    .map(CompiledTransform::compile)
    .collect::<Result<Vec<_>, _>>()?;

  let src = package.src_dir();
  let files = walk_files(&src).map_err(|source| BundleError::ListFiles {
    package: package.name.clone(),
    source,
  })?;

  let mut written = Vec::new();
  for relative in files {
    let root_relative = Path::new(SOURCE_DIR).join(&relative);
    if !rule.files.iter().any(|glob| matches_glob(glob, &root_relative)) {
      continue;
    }

    let source = src.join(&relative);
    let mut contents = tokio::fs::read(&source).await.map_err(|e| BundleError::Read {
      path: source.clone(),
      source: e,
    })?;

    if relative.extension().is_some_and(|ext| ext == "php")
      && !transforms.is_empty()
      && let Ok(text) = String::from_utf8(contents.clone())
    {
      contents = transforms
        .iter()
        .fold(text, |text, transform| transform.apply(&text))
        .into_bytes();
    }

    let destination = out_dir.join(copy_destination(&relative, rule.rename_index));
    write_file(&destination, contents).await.map_err(|source| BundleError::Write {
      path: destination.clone(),
      source,
    })?;
    debug!(package = %package.name, file = %destination.display(), "copied file");
    written.push(destination);
  }

  Ok(written)
}
