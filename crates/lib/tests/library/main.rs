//! End-to-end tests for the wpbuild library: full builds and watch-mode
//! rebuilds over package trees on disk.

#![cfg(unix)]

mod common;
mod pipeline_tests;
mod rebuild_tests;
