//! Syntax scan of compiled CommonJS modules.
//!
//! The linker only rewrites what the syntax tree says is code: `require("x")`
//! and `import("x")` calls and `globalThis.*` define uses. Strings, comments
//! and member calls such as `obj.require("x")` are left alone.

use std::collections::BTreeSet;
use std::ops::Range;

use thiserror::Error;
use tree_sitter::{Node, Parser};

#[derive(Debug, Error)]
pub enum ScanError {
  #[error("JavaScript grammar unavailable: {0}")]
  Language(#[from] tree_sitter::LanguageError),

  #[error("parser returned no syntax tree")]
  NoTree,
}

/// A rewrite the linker applies at a byte range of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
  /// `require("x")` or `import("x")`, spanning the whole call.
  Import { specifier: String, dynamic: bool },
  /// A build-mode define use, replaced by its literal.
  Define { literal: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
  pub span: Range<usize>,
  pub edit: Edit,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleScan {
  /// Rewrite sites ordered by position. Sites never overlap.
  pub sites: Vec<Site>,
  /// Names the module assigns on `exports`.
  pub exports: BTreeSet<String>,
  /// Specifiers re-exported wholesale through esbuild's `__reExport` helper.
  pub reexports: Vec<String>,
}

/// Scan one compiled module.
pub fn scan_module(source: &str, defines: &[(&str, &str)]) -> Result<ModuleScan, ScanError> {
  let mut parser = Parser::new();
  parser.set_language(&tree_sitter_javascript::LANGUAGE.into())?;
  let tree = parser.parse(source, None).ok_or(ScanError::NoTree)?;

  let mut scan = ModuleScan::default();
  let mut stack = vec![tree.root_node()];

  while let Some(node) = stack.pop() {
    match node.kind() {
      "call_expression" => {
        if let Some((specifier, dynamic)) = import_call(node, source) {
          scan.sites.push(Site {
            span: node.byte_range(),
            edit: Edit::Import { specifier, dynamic },
          });
          continue;
        }
        record_helper_call(node, source, &mut scan);
      }
      "member_expression" => {
        let used = text(node, source);
        if let Some((_, literal)) = defines.iter().find(|(expression, _)| *expression == used) {
          scan.sites.push(Site {
            span: node.byte_range(),
            edit: Edit::Define {
              literal: literal.to_string(),
            },
          });
          continue;
        }
      }
      "assignment_expression" => {
        if let Some(name) = assigned_export(node, source) {
          scan.exports.insert(name);
        }
      }
      _ => {}
    }

    // Reversed so nodes pop in source order.
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
    stack.extend(children.into_iter().rev());
  }

  scan.sites.sort_by_key(|site| site.span.start);
  Ok(scan)
}

/// Named exports assigned by a compiled CommonJS module.
pub fn named_exports(source: &str) -> Result<BTreeSet<String>, ScanError> {
  scan_module(source, &[]).map(|scan| scan.exports)
}

fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
  source.get(node.byte_range()).unwrap_or_default()
}

fn arguments<'t>(call: Node<'t>) -> Vec<Node<'t>> {
  let Some(arguments) = call.child_by_field_name("arguments") else {
    return Vec::new();
  };
  if arguments.kind() != "arguments" {
    return Vec::new();
  }
  let mut cursor = arguments.walk();
  arguments
    .named_children(&mut cursor)
    .filter(|arg| arg.kind() != "comment")
    .collect()
}

/// The value of a plain string literal. Literals with escapes or template
/// substitutions are not treated as static.
fn string_value(node: Node<'_>, source: &str) -> Option<String> {
  match node.kind() {
    "string" => {}
    "template_string" => {
      let mut cursor = node.walk();
      if node.named_children(&mut cursor).any(|c| c.kind() == "template_substitution") {
        return None;
      }
    }
    _ => return None,
  }
  let raw = text(node, source);
  let inner = raw.get(1..raw.len().checked_sub(1)?)?;
  (!inner.contains('\\')).then(|| inner.to_string())
}

/// `require("x")` → `("x", false)`, `import("x")` → `("x", true)`.
fn import_call(call: Node<'_>, source: &str) -> Option<(String, bool)> {
  let function = call.child_by_field_name("function")?;
  let dynamic = match function.kind() {
    "import" => true,
    "identifier" if text(function, source) == "require" => false,
    _ => return None,
  };
  match arguments(call).as_slice() {
    [specifier] => Some((string_value(*specifier, source)?, dynamic)),
    _ => None,
  }
}

/// The specifier of a `require` call, looking through wrappers such as
/// `__toESM(require("x"))`.
fn required_specifier(mut node: Node<'_>, source: &str) -> Option<String> {
  loop {
    if node.kind() != "call_expression" {
      return None;
    }
    if let Some((specifier, false)) = import_call(node, source) {
      return Some(specifier);
    }
    node = *arguments(node).first()?;
  }
}

fn is_exports_object(node: Node<'_>, source: &str) -> bool {
  matches!(text(node, source), "exports" | "module.exports")
}

/// `exports.name = …` and `module.exports.name = …`.
fn assigned_export(assignment: Node<'_>, source: &str) -> Option<String> {
  let left = assignment.child_by_field_name("left")?;
  if left.kind() != "member_expression" {
    return None;
  }
  let object = left.child_by_field_name("object")?;
  let property = left.child_by_field_name("property")?;
  (is_exports_object(object, source) && property.kind() == "property_identifier")
    .then(|| text(property, source).to_string())
}

/// esbuild's export helpers and `Object.defineProperty(exports, "name", …)`.
fn record_helper_call(call: Node<'_>, source: &str, scan: &mut ModuleScan) {
  let Some(function) = call.child_by_field_name("function") else {
    return;
  };
  let args = arguments(call);

  match text(function, source) {
    "__export" => {
      if let Some(object) = args.get(1).filter(|arg| arg.kind() == "object") {
        let mut cursor = object.walk();
        for entry in object.named_children(&mut cursor) {
          let name = match entry.kind() {
            "pair" => entry.child_by_field_name("key").and_then(|key| match key.kind() {
              "property_identifier" => Some(text(key, source).to_string()),
              _ => string_value(key, source),
            }),
            "shorthand_property_identifier" => Some(text(entry, source).to_string()),
            _ => None,
          };
          scan.exports.extend(name);
        }
      }
    }
    "__reExport" => {
      if let Some(specifier) = args.get(1).and_then(|arg| required_specifier(*arg, source)) {
        scan.reexports.push(specifier);
      }
    }
    "Object.defineProperty" => {
      if let [target, name, ..] = args.as_slice()
        && is_exports_object(*target, source)
        && let Some(name) = string_value(*name, source)
      {
        scan.exports.insert(name);
      }
    }
    _ => {}
  }
}
