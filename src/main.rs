//! bookcast entry point.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use bookcast::api;
use bookcast::config::Config;
use bookcast::pipeline::{Converter, Downloader, Pipeline};
use bookcast::store::Store;
use bookcast::vendor::{HttpVendorClient, PlainVoucherDecryptor};

/// Audiobook library downloader and podcast feed server
#[derive(Parser, Debug)]
#[command(name = "bookcast")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML configuration file (default: bookcast.toml if present)
    #[arg(short, long, global = true, env = "BOOKCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the final audio directory
    #[arg(long, global = true)]
    audio_dir: Option<PathBuf>,

    /// Override the metadata record directory
    #[arg(long, global = true)]
    metadata_dir: Option<PathBuf>,

    /// Override the staging download directory
    #[arg(long, global = true)]
    download_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Acquire every owned title not yet in the library, then exit
    Download,
    /// Re-fetch metadata records for titles already in the library
    Metadata,
    /// Serve the library as podcast feeds until interrupted
    Serve,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Config file consulted when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "bookcast.toml";

async fn run(cli: Cli) -> bookcast::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => {
            let fallback = std::path::Path::new(DEFAULT_CONFIG_FILE);
            if fallback.exists() {
                Config::load(fallback)?
            } else {
                Config::default()
            }
        }
    };
    if let Some(dir) = cli.audio_dir {
        config.library.audio_dir = dir;
    }
    if let Some(dir) = cli.metadata_dir {
        config.library.metadata_dir = dir;
    }
    if let Some(dir) = cli.download_dir {
        config.library.download_dir = dir;
    }

    std::fs::create_dir_all(&config.library.audio_dir)?;
    std::fs::create_dir_all(&config.library.metadata_dir)?;
    std::fs::create_dir_all(&config.library.download_dir)?;

    let store = Store::new(&config.library.metadata_dir, &config.library.audio_dir);

    match cli.command {
        Commands::Download => build_pipeline(&config, store)?.run().await,
        Commands::Metadata => build_pipeline(&config, store)?.refresh_metadata().await,
        Commands::Serve => api::serve(store, &config.library, &config.server).await,
    }
}

fn build_pipeline(config: &Config, store: Store) -> bookcast::Result<Pipeline> {
    let client = HttpVendorClient::from_config(&config.vendor)?;
    let downloader = Downloader::new(&config.library, &config.download)?;
    let converter = Converter::from_path(&config.library, store.clone())?;
    Ok(Pipeline::new(
        Arc::new(client),
        Arc::new(PlainVoucherDecryptor),
        store,
        downloader,
        converter,
    ))
}
