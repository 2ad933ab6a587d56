//! Watch mode.
//!
//! A recursive `notify` watcher on `packages/` feeds source changes into a
//! channel. Bursts of events are debounced, mapped to their owning packages and
//! drained through the [`RebuildQueue`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, warn};

use super::{BuildContext, BuildError, RebuildQueue, drain_queue};
use crate::consts::{SOURCE_DIR, WATCH_DEBOUNCE_MS};
use crate::package::PackageRegistry;
use crate::util::fs::is_excluded_source;

/// `EMFILE` on every platform notify supports.
const EMFILE: i32 = 24;

/// Extensions whose changes trigger a rebuild.
const WATCHED_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "json", "scss", "css", "php"];

#[derive(Debug, Error)]
pub enum WatchError {
  #[error(
    "too many open files while watching {path}; raise the open file limit (for example `ulimit -n 10240`) and restart"
  )]
  TooManyOpenFiles { path: PathBuf },

  #[error(
    "file watch limit reached while watching {path}; raise it (on Linux: `sysctl fs.inotify.max_user_watches=524288`) and restart"
  )]
  WatchLimit { path: PathBuf },

  #[error("failed to watch {path}: {source}")]
  Watcher {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },
}

impl WatchError {
  /// Classify a notify error; descriptor exhaustion gets remediation text.
  pub fn from_notify(path: &Path, source: notify::Error) -> Self {
    match &source.kind {
      notify::ErrorKind::MaxFilesWatch => WatchError::WatchLimit {
        path: path.to_path_buf(),
      },
      notify::ErrorKind::Io(io) if io.raw_os_error() == Some(EMFILE) => WatchError::TooManyOpenFiles {
        path: path.to_path_buf(),
      },
      _ => WatchError::Watcher {
        path: path.to_path_buf(),
        source,
      },
    }
  }

  /// Whether watching cannot continue after this error.
  pub fn is_fatal(&self) -> bool {
    matches!(self, WatchError::TooManyOpenFiles { .. } | WatchError::WatchLimit { .. })
  }
}

enum WatchMessage {
  Changed(PathBuf),
  Failed(notify::Error),
}

/// The package a changed path should rebuild, if any.
///
/// Only files under a known package's `src/`, outside tests and stories, with
/// a buildable extension count.
pub fn package_for_change<'a>(registry: &'a PackageRegistry, path: &Path) -> Option<&'a str> {
  let package = registry.owner_of(path)?;
  let relative = path.strip_prefix(&package.dir).ok()?.strip_prefix(SOURCE_DIR).ok()?;

  let extension = relative.extension()?.to_str()?;
  if !WATCHED_EXTENSIONS.contains(&extension) || is_excluded_source(relative) {
    return None;
  }
  Some(package.name.as_str())
}

fn is_relevant(kind: &EventKind) -> bool {
  matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Watch the packages directory and rebuild on change. Runs until a fatal
/// watcher error.
pub async fn watch(ctx: Arc<BuildContext>) -> Result<(), BuildError> {
  let root = ctx.config.packages_dir();
  let (tx, mut rx) = mpsc::channel::<WatchMessage>(1000);

  let mut watcher = RecommendedWatcher::new(
    move |res: Result<Event, notify::Error>| match res {
      Ok(event) if is_relevant(&event.kind) => {
        for path in event.paths {
          let _ = tx.blocking_send(WatchMessage::Changed(path));
        }
      }
      Ok(_) => {}
      Err(e) => {
        let _ = tx.blocking_send(WatchMessage::Failed(e));
      }
    },
    Config::default(),
  )
  .map_err(|e| WatchError::from_notify(&root, e))?;

  watcher
    .watch(&root, RecursiveMode::Recursive)
    .map_err(|e| WatchError::from_notify(&root, e))?;
  info!(dir = %root.display(), "watching for changes");

  watch_loop(&ctx.registry, &root, &mut rx, |mut batch| {
    let ctx = Arc::clone(&ctx);
    async move {
      let report = drain_queue(&ctx, &mut batch).await;
      if report.is_success() {
        info!(elapsed_ms = report.elapsed.as_millis() as u64, "rebuild finished");
      } else {
        warn!(failed = report.failures.len(), "rebuild finished with errors");
      }
    }
  })
  .await
}

/// Collect changed packages and hand them to `rebuild` once no event has
/// arrived for the debounce interval. Returns when the channel closes or on a
/// fatal watcher error.
async fn watch_loop<R, F>(
  registry: &PackageRegistry,
  root: &Path,
  rx: &mut mpsc::Receiver<WatchMessage>,
  mut rebuild: R,
) -> Result<(), BuildError>
where
  R: FnMut(RebuildQueue) -> F,
  F: Future<Output = ()>,
{
  let mut queue = RebuildQueue::new();
  let debounce = Duration::from_millis(WATCH_DEBOUNCE_MS);

  loop {
    tokio::select! {
      message = rx.recv() => match message {
        Some(WatchMessage::Changed(path)) => {
          if let Some(package) = package_for_change(registry, &path) {
            debug!(package, path = %path.display(), "source changed");
            queue.push(package);
          }
        }
        Some(WatchMessage::Failed(e)) => {
          let e = WatchError::from_notify(root, e);
          if e.is_fatal() {
            error!(error = %e, "watcher cannot continue");
            return Err(e.into());
          }
          warn!(error = %e, "watcher error");
        }
        None => {
          info!("watcher stopped");
          return Ok(());
        }
      },

      _ = time::sleep(debounce), if !queue.is_empty() => {
        rebuild(std::mem::take(&mut queue)).await;
      }
    }
  }
}
