mod cmd;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::output::print_error;

/// wpbuild - dependency-ordered build for WordPress packages
#[derive(Parser)]
#[command(name = "wpbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Keep watching package sources after the initial build
  #[arg(short, long)]
  watch: bool,
}

fn main() -> ExitCode {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let cli = Cli::parse();

  match cmd::cmd_build(cli.watch) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
