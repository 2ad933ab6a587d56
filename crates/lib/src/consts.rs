pub const APP_NAME: &str = "wpbuild";

/// npm scope shared by every sibling package.
pub const PACKAGE_SCOPE: &str = "@wordpress/";

/// Global object classic scripts attach themselves to.
pub const SCRIPT_GLOBAL: &str = "wp";

pub const PACKAGES_DIR: &str = "packages";
pub const SOURCE_DIR: &str = "src";
pub const BUILD_DIR: &str = "build";
pub const BUILD_MODULE_DIR: &str = "build-module";
pub const BUILD_STYLE_DIR: &str = "build-style";

/// Repository-level output subdirectories for bundled artifacts.
pub const SCRIPTS_OUT_DIR: &str = "scripts";
pub const MODULES_OUT_DIR: &str = "modules";

pub const DEFAULT_STYLE_ENTRY_GLOB: &str = "src/*.scss";
pub const CSS_MODULES_STYLESHEET: &str = "modules.css";

pub const DEFAULT_BROWSER_TARGET: &str = "es2020";

/// Debounce window for coalescing watcher events, in milliseconds.
pub const WATCH_DEBOUNCE_MS: u64 = 200;

/// Length of the hash suffix appended to scoped CSS module class names.
pub const CSS_MODULE_HASH_LEN: usize = 6;
