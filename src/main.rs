mod app;
mod cache;
mod commands;
mod config;
mod directory;
mod event;
mod export;
mod scheduler;
mod session;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "orgx")]
#[command(about = "A terminal UI for exploring your Genesys Cloud org chart")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/orgx/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Region domain to use (e.g. mypurecloud.ie)
  #[arg(short, long)]
  region: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override region if specified on command line
  let config = if let Some(region) = args.region {
    config::Config {
      directory: config::DirectoryConfig {
        region,
        ..config.directory
      },
      ..config
    }
  } else {
    config
  };

  // Initialize and run the app
  let mut app = app::App::new(config).await?;
  app.run().await?;

  Ok(())
}

/// Route logs to a file: the TUI owns the terminal, so nothing may write
/// to stdout. ORGX_LOG selects the filter, defaulting to info.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("orgx");
  std::fs::create_dir_all(&log_dir)?;

  let appender = tracing_appender::rolling::daily(log_dir, "orgx.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = tracing_subscriber::EnvFilter::try_from_env("ORGX_LOG")
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
