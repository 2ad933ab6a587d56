//! External compiler invocations.
//!
//! JavaScript down-levelling, minification and SCSS compilation are delegated
//! to `esbuild` and `sass`. Each call is one subprocess fed through stdin or a
//! file argument, with its stdout captured as the result. A shared semaphore
//! caps how many compiler processes run at once across all packages.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::{BuildConfig, ToolPaths};

#[derive(Debug, Error)]
pub enum ToolError {
  #[error("failed to start {tool} ({program}): {source}; is it installed?")]
  Spawn {
    tool: &'static str,
    program: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("{tool} failed on {subject} (exit code {code:?}): {stderr}")]
  Failed {
    tool: &'static str,
    subject: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{tool} produced non-UTF-8 output for {subject}")]
  InvalidOutput { tool: &'static str, subject: String },
}

/// Output module format of a transform or bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleFormat {
  CommonJs,
  Esm,
}

impl ModuleFormat {
  fn esbuild_flag(self) -> &'static str {
    match self {
      ModuleFormat::CommonJs => "cjs",
      ModuleFormat::Esm => "esm",
    }
  }
}

/// esbuild loader for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loader {
  Js,
  Jsx,
  Ts,
  Tsx,
}

impl Loader {
  pub fn from_path(path: &Path) -> Option<Self> {
    match path.extension()?.to_str()? {
      "js" | "mjs" | "cjs" => Some(Loader::Js),
      "jsx" => Some(Loader::Jsx),
      "ts" | "mts" | "cts" => Some(Loader::Ts),
      "tsx" => Some(Loader::Tsx),
      _ => None,
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      Loader::Js => "js",
      Loader::Jsx => "jsx",
      Loader::Ts => "ts",
      Loader::Tsx => "tsx",
    }
  }
}

/// Handle to the external compilers.
///
/// Cheap to clone; clones share the process limit.
#[derive(Debug, Clone)]
pub struct Toolchain {
  tools: ToolPaths,
  target: String,
  slots: Arc<Semaphore>,
}

impl Toolchain {
  pub fn new(tools: ToolPaths, target: impl Into<String>, max_processes: usize) -> Self {
    Self {
      tools,
      target: target.into(),
      slots: Arc::new(Semaphore::new(max_processes.max(1))),
    }
  }

  pub fn from_config(config: &BuildConfig) -> Self {
    Self::new(config.tools.clone(), config.target.clone(), config.parallelism)
  }

  /// Transform one source file to `format`, down-levelled to the browser target.
  pub async fn transform(
    &self,
    source: &str,
    loader: Loader,
    format: ModuleFormat,
    sourcefile: &Path,
  ) -> Result<String, ToolError> {
    let args = vec![
      format!("--loader={}", loader.as_str()),
      format!("--format={}", format.esbuild_flag()),
      format!("--target={}", self.target),
      "--jsx=automatic".to_string(),
      format!("--sourcefile={}", sourcefile.display()),
      "--log-level=warning".to_string(),
    ];
    self
      .run("esbuild", &self.tools.esbuild, &args, Some(source), &sourcefile.display().to_string())
      .await
  }

  /// Minify an already bundled file.
  pub async fn minify(&self, code: &str, format: ModuleFormat, subject: &str) -> Result<String, ToolError> {
    let mut args = vec![
      "--minify".to_string(),
      "--loader=js".to_string(),
      format!("--target={}", self.target),
      "--log-level=warning".to_string(),
    ];
    if format == ModuleFormat::Esm {
      args.push("--format=esm".to_string());
    }
    self.run("esbuild", &self.tools.esbuild, &args, Some(code), subject).await
  }

  /// Compile an SCSS entry point to plain CSS.
  pub async fn compile_scss(&self, entry: &Path, load_paths: &[PathBuf]) -> Result<String, ToolError> {
    let mut args = vec!["--no-source-map".to_string(), "--style=expanded".to_string()];
    args.extend(load_paths.iter().map(|p| format!("--load-path={}", p.display())));
    args.push(entry.display().to_string());
    self
      .run("sass", &self.tools.sass, &args, None, &entry.display().to_string())
      .await
  }

  async fn run(
    &self,
    tool: &'static str,
    program: &Path,
    args: &[String],
    stdin: Option<&str>,
    subject: &str,
  ) -> Result<String, ToolError> {
    let _permit = self.slots.acquire().await.expect("toolchain semaphore is never closed");

    debug!(tool, program = %program.display(), subject, "running compiler");

    let mut command = Command::new(program);
    command
      .args(args)
      .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ToolError::Spawn {
      tool,
      program: program.to_path_buf(),
      source,
    })?;

    // Feed stdin concurrently with reading stdout so large inputs cannot deadlock.
    let writer = match (stdin, child.stdin.take()) {
      (Some(input), Some(mut pipe)) => {
        let input = input.to_string();
        Some(tokio::spawn(async move {
          let _ = pipe.write_all(input.as_bytes()).await;
        }))
      }
      _ => None,
    };

    let output = child.wait_with_output().await.map_err(|source| ToolError::Spawn {
      tool,
      program: program.to_path_buf(),
      source,
    })?;

    if let Some(writer) = writer {
      let _ = writer.await;
    }

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      debug!(tool, subject, stderr = %stderr, "compiler failed");
      return Err(ToolError::Failed {
        tool,
        subject: subject.to_string(),
        code: output.status.code(),
        stderr,
      });
    }

    String::from_utf8(output.stdout).map_err(|_| ToolError::InvalidOutput {
      tool,
      subject: subject.to_string(),
    })
  }
}
