//! Watch-mode rebuild queue.

use std::collections::BTreeSet;

/// Packages waiting for a rebuild.
///
/// `pending` packages are transpiled and bundled; `rebundle` packages are only
/// bundled again. A package pending a full rebuild is never also queued for a
/// rebundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildQueue {
  pending: BTreeSet<String>,
  rebundle: BTreeSet<String>,
}

impl RebuildQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue a full rebuild. Returns `false` if it was already queued.
  pub fn push(&mut self, package: impl Into<String>) -> bool {
    let package = package.into();
    self.rebundle.remove(&package);
    self.pending.insert(package)
  }

  /// Queue a bundle-only pass, unless a full rebuild is already queued.
  pub fn push_rebundle(&mut self, package: impl Into<String>) -> bool {
    let package = package.into();
    if self.pending.contains(&package) {
      return false;
    }
    self.rebundle.insert(package)
  }

  /// Drain the full-rebuild set, sorted.
  pub fn take_pending(&mut self) -> Vec<String> {
    std::mem::take(&mut self.pending).into_iter().collect()
  }

  /// Drain the rebundle set, sorted.
  pub fn take_rebundle(&mut self) -> Vec<String> {
    std::mem::take(&mut self.rebundle).into_iter().collect()
  }

  pub fn is_empty(&self) -> bool {
    self.pending.is_empty() && self.rebundle.is_empty()
  }

  pub fn len(&self) -> usize {
    self.pending.len() + self.rebundle.len()
  }
}
