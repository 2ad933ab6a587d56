//! CSS Modules: locally scoped class names.

use std::collections::BTreeMap;

use super::{CssVisitor, walk};
use crate::consts::CSS_MODULE_HASH_LEN;
use crate::util::hash::short_hash;

/// A CSS module after scoping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedStylesheet {
  /// Stylesheet with every local class renamed.
  pub css: String,
  /// Local class name → scoped class name.
  pub classes: BTreeMap<String, String>,
}

impl ScopedStylesheet {
  /// JSON object text of the class map.
  fn class_map_json(&self) -> String {
    serde_json::to_string_pretty(&self.classes).unwrap_or_else(|_| "{}".to_string())
  }

  /// CommonJS module exporting the class map.
  pub fn commonjs_module(&self) -> String {
    format!("module.exports = {};\n", self.class_map_json())
  }

  /// ES module default-exporting the class map.
  pub fn esm_module(&self) -> String {
    format!("export default {};\n", self.class_map_json())
  }
}

struct Scoper<'a> {
  package: &'a str,
  path: &'a str,
  classes: BTreeMap<String, String>,
}

impl Scoper<'_> {
  fn scoped(&mut self, local: &str) -> String {
    let package = self.package;
    let path = self.path;
    self
      .classes
      .entry(local.to_string())
      .or_insert_with(|| format!("{}_{}", local, short_hash(&[package, path, local], CSS_MODULE_HASH_LEN)))
      .clone()
  }

  /// Rewrite `.class` tokens of a selector. `:global(...)` contents are copied
  /// unscoped without the wrapper; `:local(...)` is unwrapped and scoped.
  fn rewrite(&mut self, selector: &str, scope: bool) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut rest = selector;

    while let Some(ch) = rest.chars().next() {
      if ch == ':' {
        if let Some((inner, after)) = pseudo_argument(rest, ":global(") {
          out.push_str(&self.rewrite(inner, false));
          rest = after;
          continue;
        }
        if let Some((inner, after)) = pseudo_argument(rest, ":local(") {
          out.push_str(&self.rewrite(inner, true));
          rest = after;
          continue;
        }
      }

      if ch == '[' {
        let end = rest.find(']').map(|e| e + 1).unwrap_or(rest.len());
        out.push_str(&rest[..end]);
        rest = &rest[end..];
        continue;
      }

      if ch == '.' && scope {
        let ident_len = ident_length(&rest[1..]);
        if ident_len > 0 {
          let local = &rest[1..1 + ident_len];
          out.push('.');
          out.push_str(&self.scoped(local));
          rest = &rest[1 + ident_len..];
          continue;
        }
      }

      out.push(ch);
      rest = &rest[ch.len_utf8()..];
    }

    out
  }
}

impl CssVisitor for Scoper<'_> {
  fn selector(&mut self, prelude: &str) -> String {
    self.rewrite(prelude, true)
  }
}

/// If `text` starts with `prefix` (e.g. `:global(`), return the balanced
/// argument and the text after its closing paren.
fn pseudo_argument<'t>(text: &'t str, prefix: &str) -> Option<(&'t str, &'t str)> {
  let body = text.strip_prefix(prefix)?;
  let mut depth = 1usize;
  for (idx, ch) in body.char_indices() {
    match ch {
      '(' => depth += 1,
      ')' => {
        depth -= 1;
        if depth == 0 {
          return Some((&body[..idx], &body[idx + 1..]));
        }
      }
      _ => {}
    }
  }
  None
}

/// Length of a CSS identifier at the start of `text`, 0 if none.
fn ident_length(text: &str) -> usize {
  let mut chars = text.char_indices();
  let valid_start = match chars.next() {
    Some((_, c)) if c.is_ascii_alphabetic() || c == '_' || !c.is_ascii() => true,
    Some((_, '-')) => text[1..]
      .chars()
      .next()
      .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '-'),
    _ => false,
  };
  if !valid_start {
    return 0;
  }

  text
    .char_indices()
    .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || !c.is_ascii()))
    .map(|(idx, _)| idx)
    .unwrap_or(text.len())
}

/// Scope every local class of a CSS module.
///
/// Scoped names are `<local>_<hash>` where the hash covers the package, the
/// module's path and the local name, so they are stable across builds.
pub fn scope_css_module(css: &str, package: &str, path: &str) -> ScopedStylesheet {
  let mut scoper = Scoper {
    package,
    path,
    classes: BTreeMap::new(),
  };
  let css = walk(css, &mut scoper);
  ScopedStylesheet {
    css,
    classes: scoper.classes,
  }
}
