//! Import resolution rule table.
//!
//! Every bare specifier met while linking a bundle is matched against an
//! ordered list of `(matcher → strategy)` rows; the first row whose matcher
//! accepts the specifier (and whose format applies) decides how the import is
//! satisfied. Relative imports never reach the table.

use crate::consts::SCRIPT_GLOBAL;
use crate::package::{Package, PackageRegistry};

/// Output format of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleFormat {
  /// Classic script: an immediately invoked function assigning a global.
  Iife,
  /// Script module: a native ES module.
  Esm,
}

/// `(specifier, global, handle)` for vendor libraries the WordPress runtime
/// provides as globals.
pub const VENDOR_GLOBALS: &[(&str, &str, &str)] = &[
  ("react", "React", "react"),
  ("react-dom", "ReactDOM", "react-dom"),
  ("react/jsx-runtime", "ReactJSXRuntime", "react-jsx-runtime"),
  ("jquery", "jQuery", "jquery"),
  ("lodash", "lodash", "lodash"),
  ("lodash-es", "lodash", "lodash"),
  ("moment", "moment", "moment"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
  /// The specifier, verbatim.
  Exact(&'static str),
  /// A sibling whose script module exports include the requested path.
  SiblingScriptModule,
  /// The root of a sibling that is a classic script.
  SiblingScript,
  /// Any sibling package.
  Sibling,
  /// Anything.
  Any,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
  /// `window.<global>`, registered under `handle`.
  VendorGlobal { global: &'static str, handle: &'static str },
  /// Left as a genuine ES module import.
  ExternalModule,
  /// `window.wp.<camelCaseName>`, registered as `wp-<name>`.
  ScriptGlobal,
  /// Inlined from the sibling's compiled CommonJS tree.
  InlineSibling,
  /// Inlined, looked up in `node_modules`.
  Inline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
  pub matcher: Matcher,
  /// Format the row applies to; `None` for both.
  pub format: Option<BundleFormat>,
  pub strategy: Strategy,
}

/// How one specifier is satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'a> {
  Global { expression: String, handle: String },
  ExternalModule { id: String },
  InlineSibling { package: &'a Package, subpath: String },
  Inline,
}

/// The rows, in priority order.
pub fn default_rules() -> Vec<Rule> {
  let mut rules: Vec<Rule> = VENDOR_GLOBALS
    .iter()
    .map(|&(specifier, global, handle)| Rule {
      matcher: Matcher::Exact(specifier),
      format: Some(BundleFormat::Iife),
      strategy: Strategy::VendorGlobal { global, handle },
    })
    .collect();

  rules.extend([
    Rule {
      matcher: Matcher::SiblingScriptModule,
      format: Some(BundleFormat::Esm),
      strategy: Strategy::ExternalModule,
    },
    Rule {
      matcher: Matcher::SiblingScript,
      format: Some(BundleFormat::Iife),
      strategy: Strategy::ScriptGlobal,
    },
    Rule {
      matcher: Matcher::Sibling,
      format: None,
      strategy: Strategy::InlineSibling,
    },
    Rule {
      matcher: Matcher::Any,
      format: None,
      strategy: Strategy::Inline,
    },
  ]);
  rules
}

/// The rule table bound to a registry and the package being bundled.
///
/// Imports of the package being bundled from itself are never externalized.
#[derive(Debug)]
pub struct ResolveRules<'a> {
  registry: &'a PackageRegistry,
  current: &'a str,
  rules: Vec<Rule>,
}

impl<'a> ResolveRules<'a> {
  pub fn new(registry: &'a PackageRegistry, current: &'a str) -> Self {
    Self {
      registry,
      current,
      rules: default_rules(),
    }
  }

  pub fn rules(&self) -> &[Rule] {
    &self.rules
  }

  pub fn resolve(&self, specifier: &str, format: BundleFormat) -> Resolution<'a> {
    let sibling = self
      .registry
      .sibling_for_specifier(specifier)
      .filter(|(package, _)| package.name != self.current);

    for rule in &self.rules {
      if rule.format.is_some_and(|f| f != format) {
        continue;
      }
      if matches(&rule.matcher, specifier, sibling) {
        return apply(&rule.strategy, specifier, sibling);
      }
    }
    Resolution::Inline
  }
}

fn matches(matcher: &Matcher, specifier: &str, sibling: Option<(&Package, &str)>) -> bool {
  match (matcher, sibling) {
    (Matcher::Exact(expected), _) => specifier == *expected,
    (Matcher::SiblingScriptModule, Some((package, subpath))) => package
      .capabilities
      .script_module_exports
      .contains_key(&export_key(subpath)),
    (Matcher::SiblingScript, Some((package, subpath))) => package.capabilities.script && subpath.is_empty(),
    (Matcher::Sibling, Some(_)) => true,
    (Matcher::Any, _) => true,
    _ => false,
  }
}

fn apply<'a>(strategy: &Strategy, specifier: &str, sibling: Option<(&'a Package, &str)>) -> Resolution<'a> {
  match (strategy, sibling) {
    (Strategy::VendorGlobal { global, handle }, _) => Resolution::Global {
      expression: format!("window.{}", global),
      handle: handle.to_string(),
    },
    (Strategy::ExternalModule, _) => Resolution::ExternalModule {
      id: specifier.to_string(),
    },
    (Strategy::ScriptGlobal, Some((package, _))) => Resolution::Global {
      expression: format!("window.{}.{}", SCRIPT_GLOBAL, camel_case(&package.name)),
      handle: script_handle(&package.name),
    },
    (Strategy::InlineSibling, Some((package, subpath))) => Resolution::InlineSibling {
      package,
      subpath: subpath.to_string(),
    },
    _ => Resolution::Inline,
  }
}

/// Export map key for a sibling subpath: `""` → `"."`, `"router"` → `"./router"`.
fn export_key(subpath: &str) -> String {
  if subpath.is_empty() {
    ".".to_string()
  } else {
    format!("./{}", subpath)
  }
}

/// `block-editor` → `blockEditor`.
pub fn camel_case(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut upper = false;
  for ch in name.chars() {
    if ch == '-' || ch == '_' {
      upper = !out.is_empty();
    } else if upper {
      out.extend(ch.to_uppercase());
      upper = false;
    } else {
      out.push(ch);
    }
  }
  out
}

/// Enqueue handle of a sibling classic script.
pub fn script_handle(name: &str) -> String {
  format!("{}-{}", SCRIPT_GLOBAL, name)
}
