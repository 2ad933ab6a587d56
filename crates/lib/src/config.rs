//! Build configuration.
//!
//! Everything the pipeline needs from the environment is read once into a
//! [`BuildConfig`] at startup and passed down explicitly. Package-level behavior
//! lives in each package's `package.json`, not here.

use std::path::{Path, PathBuf};

use crate::consts::{
  BUILD_DIR, DEFAULT_BROWSER_TARGET, MODULES_OUT_DIR, PACKAGES_DIR, SCRIPTS_OUT_DIR,
};

/// Feature-flag constants baked into bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildMode {
  /// `IS_GUTENBERG_PLUGIN`: building the plugin rather than a core package release.
  pub plugin: bool,
  /// `IS_WORDPRESS_CORE`: building for a WordPress core sync.
  pub wordpress_core: bool,
  /// `SCRIPT_DEBUG`: development build.
  pub debug: bool,
}

impl BuildMode {
  pub fn from_env() -> Self {
    Self {
      plugin: env_flag("IS_GUTENBERG_PLUGIN"),
      wordpress_core: env_flag("IS_WORDPRESS_CORE"),
      debug: env_flag("SCRIPT_DEBUG"),
    }
  }

  /// `(expression, literal)` pairs substituted into bundled code.
  pub fn defines(&self) -> [(&'static str, &'static str); 3] {
    [
      ("globalThis.IS_GUTENBERG_PLUGIN", bool_literal(self.plugin)),
      ("globalThis.IS_WORDPRESS_CORE", bool_literal(self.wordpress_core)),
      ("globalThis.SCRIPT_DEBUG", bool_literal(self.debug)),
    ]
  }
}

fn bool_literal(value: bool) -> &'static str {
  if value { "true" } else { "false" }
}

fn env_flag(name: &str) -> bool {
  std::env::var(name)
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    .unwrap_or(false)
}

/// Paths of the external compilers the transpiler delegates to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
  pub esbuild: PathBuf,
  pub sass: PathBuf,
}

impl ToolPaths {
  /// Resolve tool paths: explicit env override, then the repository's
  /// `node_modules/.bin`, then the bare name on `PATH`.
  pub fn resolve(root: &Path) -> Self {
    Self {
      esbuild: resolve_tool(root, "WPBUILD_ESBUILD", "esbuild"),
      sass: resolve_tool(root, "WPBUILD_SASS", "sass"),
    }
  }
}

fn resolve_tool(root: &Path, var: &str, name: &str) -> PathBuf {
  if let Ok(path) = std::env::var(var)
    && !path.is_empty()
  {
    return PathBuf::from(path);
  }

  let local = root.join("node_modules").join(".bin").join(name);
  if local.exists() {
    return local;
  }

  PathBuf::from(name)
}

/// Configuration for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Repository root (contains `packages/`).
  pub root: PathBuf,
  pub mode: BuildMode,
  pub tools: ToolPaths,
  /// esbuild `--target` value used for every transform.
  pub target: String,
  /// Maximum number of package jobs running at once.
  pub parallelism: usize,
}

impl BuildConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      tools: ToolPaths::resolve(&root),
      root,
      mode: BuildMode::default(),
      target: DEFAULT_BROWSER_TARGET.to_string(),
      parallelism: num_cpus(),
    }
  }

  /// Read the configuration from the environment.
  ///
  /// `WPBUILD_ROOT` overrides `default_root`.
  pub fn from_env(default_root: impl Into<PathBuf>) -> Self {
    let root = std::env::var("WPBUILD_ROOT")
      .ok()
      .filter(|v| !v.is_empty())
      .map(PathBuf::from)
      .unwrap_or_else(|| default_root.into());
    let root = dunce::canonicalize(&root).unwrap_or(root);

    let mut config = Self::new(root);
    config.mode = BuildMode::from_env();

    if let Ok(target) = std::env::var("WPBUILD_TARGET")
      && !target.is_empty()
    {
      config.target = target;
    }

    if let Some(jobs) = std::env::var("WPBUILD_JOBS").ok().and_then(|v| v.parse::<usize>().ok())
      && jobs > 0
    {
      config.parallelism = jobs;
    }

    config
  }

  pub fn packages_dir(&self) -> PathBuf {
    self.root.join(PACKAGES_DIR)
  }

  /// Repository-level output directory for bundled artifacts.
  pub fn output_dir(&self) -> PathBuf {
    self.root.join(BUILD_DIR)
  }

  pub fn script_output_dir(&self, package: &str) -> PathBuf {
    self.output_dir().join(SCRIPTS_OUT_DIR).join(package)
  }

  pub fn module_output_dir(&self, package: &str) -> PathBuf {
    self.output_dir().join(MODULES_OUT_DIR).join(package)
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
