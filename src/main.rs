mod app;
mod cache;
mod catalog;
mod config;
mod event;
mod filter;
mod logging;
mod store;
mod sync;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "storeview")]
#[command(about = "A terminal catalog browser that keeps working offline")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storeview/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Catalog base URL, overrides the config file
  #[arg(short, long)]
  url: Option<String>,

  /// Category to select at startup
  #[arg(long)]
  category: Option<String>,

  /// Never contact the catalog; browse the local cache only
  #[arg(long)]
  offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = config::Config::load(args.config.as_deref())?;

  // Command line overrides
  if let Some(url) = args.url {
    config.catalog.url = Some(url);
  }
  if let Some(category) = args.category {
    config.default_category = Some(category);
  }

  let _guard = logging::init(&config::Config::log_dir()?)?;

  // Initialize and run the app
  let events = event::EventHandler::new(Duration::from_millis(250));
  let mut app = app::App::new(config, args.offline, events.sender())?;
  app.run(events).await?;

  Ok(())
}
