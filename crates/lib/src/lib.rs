//! wpbuild-lib: dependency-ordered build pipeline for a WordPress package monorepo.
//!
//! - `package`: registry scan and per-package capability records
//! - `graph`: dependency graph, depth waves and rebuild impact analysis
//! - `transpile`: `src/` to `build/`, `build-module/` and `build-style/`
//! - `bundle`: browser bundles, asset manifests and copy rules
//! - `orchestrate`: full builds and watch mode

pub mod bundle;
pub mod config;
pub mod consts;
pub mod graph;
pub mod orchestrate;
pub mod package;
pub mod toolchain;
pub mod transpile;
pub mod util;
