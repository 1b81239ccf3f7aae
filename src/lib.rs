//! # bookcast
//!
//! Audiobook library downloader and podcast feed server.
//!
//! bookcast walks a vendor audiobook library, licenses and downloads every
//! title not yet on disk, strips the DRM into plain `.m4b` files, and
//! serves the collection as podcast RSS feeds any podcast app can play.
//!
//! ## How a title gets in
//!
//! 1. The owned-library listing is enumerated page by page. Every title
//!    without both a metadata record and a final media file is licensed
//!    inline and admitted.
//! 2. Three stages connected by single-slot channels take over: metadata
//!    normalization, a resumable download into the staging area, and
//!    remuxing into a plain `.m4b` plus the persisted metadata record.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bookcast::Config;
//! use bookcast::pipeline::{Converter, Downloader, Pipeline};
//! use bookcast::store::Store;
//! use bookcast::vendor::{HttpVendorClient, PlainVoucherDecryptor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Store::new(&config.library.metadata_dir, &config.library.audio_dir);
//!
//!     let client = HttpVendorClient::from_config(&config.vendor)?;
//!     let downloader = Downloader::new(&config.library, &config.download)?;
//!     let converter = Converter::from_path(&config.library, store.clone())?;
//!
//!     let pipeline = Pipeline::new(
//!         Arc::new(client),
//!         Arc::new(PlainVoucherDecryptor),
//!         store,
//!         downloader,
//!         converter,
//!     );
//!     pipeline.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Podcast feed server
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// The three-stage acquisition pipeline
pub mod pipeline;
/// Metadata records and media files on disk
pub mod store;
/// Core types
pub mod types;
/// Vendor API client, licensing, and vouchers
pub mod vendor;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::Pipeline;
pub use store::Store;
pub use types::BookRecord;

/// Waits for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a Ctrl+C fallback if
///   signal registration fails (restricted containers, tests).
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub(crate) async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        _ => {
            tracing::warn!("could not register unix signal handlers, falling back to ctrl-c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Waits for Ctrl+C on platforms without unix signals.
#[cfg(not(unix))]
pub(crate) async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("received ctrl-c"),
        Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
    }
}
