//! CommonJS module linker.
//!
//! Starting from an entry file of a compiled `build/` tree, the linker follows
//! `require(...)` calls, gives every reached module a numeric id and wraps the
//! modules in a small registry with its own `__wpbuild_require`. Bare
//! specifiers go through the [`ResolveRules`] table, so externals become
//! synthetic modules and never pull files into the bundle. Call sites come
//! from a syntax scan, so look-alikes inside strings and comments stay as they
//! are.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use tracing::trace;

use super::BundleError;
use super::manifest::{AssetManifest, ImportKind};
use super::rules::{BundleFormat, Resolution, ResolveRules};
use super::scan::{Edit, scan_module};
use crate::consts::{BUILD_DIR, BUILD_MODULE_DIR};

const REQUIRE_RUNTIME: &str = r#"var __wpbuild_cache = {};
function __wpbuild_require(id) {
  var cached = __wpbuild_cache[id];
  if (cached !== undefined) return cached.exports;
  var module = (__wpbuild_cache[id] = { exports: {} });
  __wpbuild_modules[id](module, module.exports);
  return module.exports;
}
"#;

/// A linked bundle, before minification.
#[derive(Debug, Clone)]
pub struct LinkedBundle {
  pub code: String,
  pub manifest: AssetManifest,
  /// Files inlined into the bundle, in id order.
  pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ModuleKey {
  File(PathBuf),
  Global(String),
  External(String),
}

/// Exports of one linked module, as far as they are statically visible.
#[derive(Debug, Default)]
struct ModuleExports {
  names: BTreeSet<String>,
  /// Modules whose exports this one re-exports wholesale.
  star: Vec<usize>,
}

/// What an import call resolved to.
enum Target {
  File(PathBuf),
  Global { expression: String, handle: String },
  External(String),
}

pub struct Linker<'a> {
  rules: &'a ResolveRules<'a>,
  format: BundleFormat,
  defines: &'a [(&'a str, &'a str)],
  bodies: Vec<String>,
  exports: Vec<ModuleExports>,
  keys: Vec<ModuleKey>,
  ids: HashMap<ModuleKey, usize>,
  pending: VecDeque<(usize, PathBuf)>,
  manifest: AssetManifest,
}

impl<'a> Linker<'a> {
  pub fn new(rules: &'a ResolveRules<'a>, format: BundleFormat, defines: &'a [(&'a str, &'a str)]) -> Self {
    Self {
      rules,
      format,
      defines,
      bodies: Vec::new(),
      exports: Vec::new(),
      keys: Vec::new(),
      ids: HashMap::new(),
      pending: VecDeque::new(),
      manifest: AssetManifest::default(),
    }
  }

  /// Link `entry` and everything it requires.
  ///
  /// `global` is the `window.wp` property an iife bundle assigns its exports to.
  pub async fn link(mut self, entry: &Path, global: &str) -> Result<LinkedBundle, BundleError> {
    if !entry.is_file() {
      return Err(BundleError::MissingEntry {
        path: entry.to_path_buf(),
      });
    }

    let entry_id = self.module_id(ModuleKey::File(entry.to_path_buf()), String::new());
    while let Some((id, path)) = self.pending.pop_front() {
      let source = tokio::fs::read_to_string(&path).await.map_err(|source| BundleError::Read {
        path: path.clone(),
        source,
      })?;

      let body = if path.extension().is_some_and(|ext| ext == "json") {
        format!("module.exports = {};", source.trim())
      } else {
        self.rewrite_module(id, &source, &path)?
      };
      trace!(id, path = %path.display(), "linked module");
      self.bodies[id] = body;
    }

    let code = match self.format {
      BundleFormat::Iife => self.emit_iife(entry_id, global),
      BundleFormat::Esm => self.emit_esm(entry_id),
    };
    let files = self
      .keys
      .iter()
      .filter_map(|key| match key {
        ModuleKey::File(path) => Some(path.clone()),
        _ => None,
      })
      .collect();

    Ok(LinkedBundle {
      code,
      manifest: self.manifest,
      files,
    })
  }

  /// Id for `key`, allocating one (and queueing files) on first sight.
  fn module_id(&mut self, key: ModuleKey, body: String) -> usize {
    if let Some(&id) = self.ids.get(&key) {
      return id;
    }
    let id = self.bodies.len();
    if let ModuleKey::File(path) = &key {
      self.pending.push_back((id, path.clone()));
    }
    self.bodies.push(body);
    self.exports.push(ModuleExports::default());
    self.keys.push(key.clone());
    self.ids.insert(key, id);
    id
  }

  /// Rewrite the import calls and define uses of module `id`, and record
  /// its exports.
  fn rewrite_module(&mut self, id: usize, source: &str, importer: &Path) -> Result<String, BundleError> {
    let scan = scan_module(source, self.defines).map_err(|e| BundleError::Scan {
      path: importer.to_path_buf(),
      source: e,
    })?;

    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    let mut required: HashMap<String, usize> = HashMap::new();

    for site in &scan.sites {
      out.push_str(&source[last..site.span.start]);
      last = site.span.end;

      let replacement = match &site.edit {
        Edit::Define { literal } => literal.clone(),
        Edit::Import { specifier, dynamic } => match (self.resolve(specifier, importer)?, *dynamic) {
          (Target::External(module), true) => {
            self.manifest.add_module_dependency(module, ImportKind::Dynamic);
            source[site.span.clone()].to_string()
          }
          (Target::External(module), false) => {
            self.manifest.add_module_dependency(module.clone(), ImportKind::Static);
            let target = self.external_module(module);
            required.insert(specifier.clone(), target);
            format!("__wpbuild_require({})", target)
          }
          (Target::Global { expression, handle }, dynamic) => {
            self.manifest.add_dependency(handle);
            let body = format!("module.exports = {};", expression);
            let target = self.module_id(ModuleKey::Global(expression), body);
            require_call(target, dynamic)
          }
          (Target::File(path), dynamic) => {
            let target = self.module_id(ModuleKey::File(path), String::new());
            if !dynamic {
              required.insert(specifier.clone(), target);
            }
            require_call(target, dynamic)
          }
        },
      };
      out.push_str(&replacement);
    }
    out.push_str(&source[last..]);

    let star = scan
      .reexports
      .iter()
      .filter_map(|specifier| required.get(specifier).copied())
      .collect();
    self.exports[id] = ModuleExports {
      names: scan.exports,
      star,
    };
    Ok(out)
  }

  fn external_module(&mut self, id: String) -> usize {
    let key = ModuleKey::External(id);
    if let Some(&existing) = self.ids.get(&key) {
      return existing;
    }
    let module = self.bodies.len();
    self.module_id(key, format!("module.exports = {};", external_binding(module)))
  }

  fn resolve(&self, specifier: &str, importer: &Path) -> Result<Target, BundleError> {
    let unresolved = || BundleError::Unresolved {
      specifier: specifier.to_string(),
      importer: importer.to_path_buf(),
    };
    let base = importer.parent().unwrap_or(Path::new("."));

    if is_relative(specifier) {
      return resolve_file(&base.join(specifier)).map(Target::File).ok_or_else(unresolved);
    }

    match self.rules.resolve(specifier, self.format) {
      Resolution::Global { expression, handle } => Ok(Target::Global { expression, handle }),
      Resolution::ExternalModule { id } => Ok(Target::External(id)),
      Resolution::InlineSibling { package, subpath } => {
        let path = if subpath.is_empty() {
          let main = package.main_entry().unwrap_or("build/index.js");
          package.dir.join(compiled_entry(main))
        } else {
          package.dir.join(BUILD_DIR).join(subpath)
        };
        resolve_file(&path).map(Target::File).ok_or_else(unresolved)
      }
      Resolution::Inline => resolve_node_module(specifier, base).map(Target::File).ok_or_else(unresolved),
    }
  }

  fn emit_registry(&self) -> String {
    let mut out = String::from("var __wpbuild_modules = {\n");
    for (id, body) in self.bodies.iter().enumerate() {
      out.push_str(&format!("{}: function (module, exports) {{\n{}\n}},\n", id, body.trim_end()));
    }
    out.push_str("};\n");
    out.push_str(REQUIRE_RUNTIME);
    out
  }

  fn emit_iife(&self, entry: usize, global: &str) -> String {
    format!(
      "(() => {{\n{}window.wp = window.wp || {{}};\nwindow.wp.{} = __wpbuild_require({});\n}})();\n",
      self.emit_registry(),
      global,
      entry
    )
  }

  fn emit_esm(&self, entry: usize) -> String {
    let mut out = String::new();
    for (id, key) in self.keys.iter().enumerate() {
      if let ModuleKey::External(specifier) = key {
        out.push_str(&format!(
          "import * as {} from {};\n",
          external_binding(id),
          js_string(specifier)
        ));
      }
    }

    out.push_str(&self.emit_registry());
    out.push_str(&format!("var __wpbuild_entry = __wpbuild_require({});\n", entry));

    let (names, has_default, star_externals) = self.entry_exports(entry);
    for specifier in &star_externals {
      out.push_str(&format!("export * from {};\n", js_string(specifier)));
    }
    if has_default {
      out.push_str("export default __wpbuild_entry.default;\n");
    } else {
      out.push_str("export default __wpbuild_entry;\n");
    }
    if !names.is_empty() {
      let list = names.into_iter().collect::<Vec<_>>().join(", ");
      out.push_str(&format!("export const {{ {} }} = __wpbuild_entry;\n", list));
    }
    out
  }

  /// Named exports of the entry, including those re-exported from inlined
  /// modules (never their `default`), whether the entry has its own
  /// `default`, and externals re-exported wholesale.
  fn entry_exports(&self, entry: usize) -> (BTreeSet<String>, bool, BTreeSet<String>) {
    let mut names = self.exports[entry].names.clone();
    let has_default = names.remove("default");
    let mut externals = BTreeSet::new();

    let mut seen = HashSet::from([entry]);
    let mut stack = self.exports[entry].star.clone();
    while let Some(id) = stack.pop() {
      if !seen.insert(id) {
        continue;
      }
      match &self.keys[id] {
        ModuleKey::External(specifier) => {
          externals.insert(specifier.clone());
        }
        _ => {
          names.extend(self.exports[id].names.iter().filter(|name| *name != "default").cloned());
          stack.extend(&self.exports[id].star);
        }
      }
    }

    names.remove("__esModule");
    (names, has_default, externals)
  }
}

fn require_call(id: usize, dynamic: bool) -> String {
  if dynamic {
    format!("Promise.resolve().then(() => __wpbuild_require({}))", id)
  } else {
    format!("__wpbuild_require({})", id)
  }
}

fn external_binding(id: usize) -> String {
  format!("__wpbuild_external_{}", id)
}

fn js_string(value: &str) -> String {
  serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn is_relative(specifier: &str) -> bool {
  specifier.starts_with("./") || specifier.starts_with("../") || specifier == "." || specifier == ".."
}

/// Map an entry declared against `build-module/` to the same file in `build/`.
pub fn compiled_entry(entry: &str) -> PathBuf {
  let entry = entry.trim_start_matches("./");
  match entry.strip_prefix(BUILD_MODULE_DIR).and_then(|rest| rest.strip_prefix('/')) {
    Some(rest) => Path::new(BUILD_DIR).join(rest),
    None => PathBuf::from(entry),
  }
}

/// Lexically drop `.` and resolve `..` components.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir if matches!(out.components().next_back(), Some(Component::Normal(_))) => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}

/// Node-style file lookup: exact, `.js`, `.json`, then `index.js`.
pub fn resolve_file(path: &Path) -> Option<PathBuf> {
  let path = &normalize(path);
  if path.is_file() {
    return Some(path.to_path_buf());
  }
  for ext in ["js", "json"] {
    let mut candidate = path.as_os_str().to_owned();
    candidate.push(".");
    candidate.push(ext);
    let candidate = PathBuf::from(candidate);
    if candidate.is_file() {
      return Some(candidate);
    }
  }
  let index = path.join("index.js");
  index.is_file().then_some(index)
}

/// Look `specifier` up in the `node_modules` directories above `from`.
fn resolve_node_module(specifier: &str, from: &Path) -> Option<PathBuf> {
  let segments: Vec<&str> = specifier.splitn(3, '/').collect();
  let (name, subpath) = match segments.as_slice() {
    [scope, name, rest] if scope.starts_with('@') => (format!("{}/{}", scope, name), Some(*rest)),
    [scope, name] if scope.starts_with('@') => (format!("{}/{}", scope, name), None),
    [name, rest @ ..] if !rest.is_empty() => (name.to_string(), Some(&specifier[name.len() + 1..])),
    [name] => (name.to_string(), None),
    _ => return None,
  };

  for dir in from.ancestors() {
    let package_dir = dir.join("node_modules").join(&name);
    if !package_dir.is_dir() {
      continue;
    }
    return match subpath {
      Some(subpath) => resolve_file(&package_dir.join(subpath)),
      None => resolve_file(&package_dir.join(package_main(&package_dir))),
    };
  }
  None
}

fn package_main(package_dir: &Path) -> String {
  std::fs::read_to_string(package_dir.join("package.json"))
    .ok()
    .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
    .and_then(|manifest| manifest.get("main").and_then(|m| m.as_str()).map(str::to_string))
    .unwrap_or_else(|| "index.js".to_string())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::package::PackageRegistry;
  use crate::util::testutil::{write_package, write_source};

  const DEFINES: &[(&str, &str)] = &[("globalThis.SCRIPT_DEBUG", "false")];

  fn fixture() -> (tempfile::TempDir, PackageRegistry) {
    let temp = tempfile::tempdir().unwrap();
    let packages = temp.path().join("packages");
    write_package(&packages, "data", r#"{ "main": "build/index.js", "wpScript": true }"#);
    write_package(
      &packages,
      "interactivity",
      r#"{ "main": "build/index.js", "wpScriptModuleExports": "./build-module/index.js" }"#,
    );
    write_package(&packages, "utils", r#"{ "main": "build/index.js" }"#);
    write_package(&packages, "app", r#"{ "main": "build/index.js", "wpScript": true }"#);

    write_source(&packages, "utils", "build/index.js", "exports.twice = (n) => n * 2;\n");
    write_source(
      &packages,
      "app",
      "build/index.js",
      concat!(
        "var data = require(\"@wordpress/data\");\n",
        "var React = require('react');\n",
        "var utils = require(\"@wordpress/utils\");\n",
        "var local = require(\"./local\");\n",
        "var config = require(\"./config.json\");\n",
        "if (globalThis.SCRIPT_DEBUG) { console.log(local); }\n",
        "exports.run = () => utils.twice(config.n);\n",
      ),
    );
    write_source(&packages, "app", "build/local/index.js", "module.exports = require(\"./../local/index.js\") || 1;\n");
    write_source(&packages, "app", "build/config.json", "{ \"n\": 2 }\n");

    write_source(
      &packages,
      "app",
      "node_modules/clsx/package.json",
      r#"{ "main": "dist/clsx.js" }"#,
    );
    write_source(&packages, "app", "node_modules/clsx/dist/clsx.js", "module.exports = () => '';\n");

    let registry = PackageRegistry::scan(&packages).unwrap();
    (temp, registry)
  }

  #[tokio::test]
  async fn links_classic_script() {
    let (_temp, registry) = fixture();
    let app = registry.get("app").unwrap();
    let rules = ResolveRules::new(&registry, "app");

    let bundle = Linker::new(&rules, BundleFormat::Iife, DEFINES)
      .link(&app.dir.join("build/index.js"), "app")
      .await
      .unwrap();

    assert!(bundle.code.starts_with("(() => {\n"));
    assert!(bundle.code.contains("module.exports = window.wp.data;"));
    assert!(bundle.code.contains("module.exports = window.React;"));
    assert!(bundle.code.contains("exports.twice = (n) => n * 2;"));
    assert!(bundle.code.contains("module.exports = { \"n\": 2 };"));
    assert!(bundle.code.contains("if (false)"));
    assert!(bundle.code.contains("window.wp.app = __wpbuild_require(0);"));
    assert!(!bundle.code.contains("require(\""));
    assert!(!bundle.code.contains("require('"));

    let deps: Vec<&str> = bundle.manifest.dependencies.iter().map(String::as_str).collect();
    assert_eq!(deps, vec!["react", "wp-data"]);
    assert!(bundle.manifest.module_dependencies.is_empty());
    // index.js, utils, local/index.js, config.json; the self-require of local is deduplicated.
    assert_eq!(bundle.files.len(), 4);
  }

  #[tokio::test]
  async fn links_script_module_with_external_imports() {
    let (_temp, registry) = fixture();
    let app = registry.get("app").unwrap();
    write_source(
      app.dir.parent().unwrap(),
      "app",
      "build/module.js",
      concat!(
        "var api = require(\"@wordpress/interactivity\");\n",
        "var clsx = require(\"clsx\");\n",
        "const lazy = () => import(\"@wordpress/interactivity\");\n",
        "const later = () => import('./local');\n",
        "__export(module_exports, {\n  default: () => main,\n  store: () => store\n});\n",
      ),
    );
    let rules = ResolveRules::new(&registry, "app");

    let bundle = Linker::new(&rules, BundleFormat::Esm, DEFINES)
      .link(&app.dir.join("build/module.js"), "app")
      .await
      .unwrap();

    assert!(bundle.code.starts_with("import * as __wpbuild_external_1 from \"@wordpress/interactivity\";\n"));
    assert!(bundle.code.contains("module.exports = __wpbuild_external_1;"));
    assert!(bundle.code.contains("module.exports = () => '';"));
    assert!(bundle.code.contains("import(\"@wordpress/interactivity\")"));
    assert!(bundle.code.contains("Promise.resolve().then(() => __wpbuild_require("));
    assert!(bundle.code.contains("export default __wpbuild_entry.default;"));
    assert!(bundle.code.contains("export const { store } = __wpbuild_entry;"));

    assert_eq!(
      bundle.manifest.module_dependencies.get("@wordpress/interactivity"),
      Some(&ImportKind::Static)
    );
    assert!(bundle.manifest.dependencies.is_empty());
  }

  #[tokio::test]
  async fn unresolved_import_names_the_importer() {
    let (_temp, registry) = fixture();
    let app = registry.get("app").unwrap();
    write_source(app.dir.parent().unwrap(), "app", "build/broken.js", "require(\"./missing\");\n");
    let rules = ResolveRules::new(&registry, "app");

    let err = Linker::new(&rules, BundleFormat::Iife, DEFINES)
      .link(&app.dir.join("build/broken.js"), "app")
      .await
      .unwrap_err();
    match err {
      BundleError::Unresolved { specifier, importer } => {
        assert_eq!(specifier, "./missing");
        assert!(importer.ends_with("build/broken.js"));
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn script_module_follows_esbuild_reexports() {
    let (_temp, registry) = fixture();
    let app = registry.get("app").unwrap();
    let packages = app.dir.parent().unwrap();
    write_source(
      packages,
      "app",
      "build/store.js",
      concat!(
        "var store_exports = {};\n",
        "__export(store_exports, {\n  default: () => store_default,\n  store: () => store\n});\n",
        "module.exports = __toCommonJS(store_exports);\n",
        "__reExport(store_exports, require(\"./router\"), module.exports);\n",
      ),
    );
    write_source(packages, "app", "build/router.js", "exports.navigate = () => {};\nexports.store = 1;\n");
    write_source(
      packages,
      "app",
      "build/entry.js",
      concat!(
        "var src_exports = {};\n",
        "__export(src_exports, {\n  getConfig: () => getConfig\n});\n",
        "module.exports = __toCommonJS(src_exports);\n",
        "__reExport(src_exports, __toESM(require(\"./store\")), module.exports);\n",
        "__reExport(src_exports, require(\"@wordpress/interactivity\"), module.exports);\n",
        "__reExport(src_exports, require(\"./entry\"), module.exports);\n",
      ),
    );
    let rules = ResolveRules::new(&registry, "app");

    let bundle = Linker::new(&rules, BundleFormat::Esm, DEFINES)
      .link(&app.dir.join("build/entry.js"), "app")
      .await
      .unwrap();

    assert!(
      bundle.code.contains("export const { getConfig, navigate, store } = __wpbuild_entry;"),
      "{}",
      bundle.code
    );
    assert!(bundle.code.contains("export * from \"@wordpress/interactivity\";"));
    // The re-exported module's default is not the entry's default.
    assert!(bundle.code.contains("export default __wpbuild_entry;"));
    assert!(!bundle.code.contains("export default __wpbuild_entry.default;"));
  }

  #[tokio::test]
  async fn look_alike_calls_are_left_alone() {
    let (_temp, registry) = fixture();
    let app = registry.get("app").unwrap();
    write_source(
      app.dir.parent().unwrap(),
      "app",
      "build/tricky.js",
      concat!(
        "var help = \"call require('react') before rendering\";\n",
        "var level = globalThis.SCRIPT_DEBUG_LEVEL;\n",
        "var dom = loader.require(\"react-dom\");\n",
        "exports.debug = globalThis.SCRIPT_DEBUG;\n",
      ),
    );
    let rules = ResolveRules::new(&registry, "app");

    let bundle = Linker::new(&rules, BundleFormat::Iife, DEFINES)
      .link(&app.dir.join("build/tricky.js"), "app")
      .await
      .unwrap();

    assert!(bundle.code.contains("var help = \"call require('react') before rendering\";"));
    assert!(bundle.code.contains("var level = globalThis.SCRIPT_DEBUG_LEVEL;"));
    assert!(bundle.code.contains("var dom = loader.require(\"react-dom\");"));
    assert!(bundle.code.contains("exports.debug = false;"));
    assert!(bundle.manifest.dependencies.is_empty());
    assert_eq!(bundle.files.len(), 1);
  }

  #[test]
  fn script_module_entries_map_to_commonjs_tree() {
    assert_eq!(compiled_entry("./build-module/index.js"), PathBuf::from("build/index.js"));
    assert_eq!(compiled_entry("build/index.js"), PathBuf::from("build/index.js"));
  }
}
