//! Podcast feed server.
//!
//! Presents the stored library as RSS feeds a podcast app can subscribe
//! to, and serves the audio files behind salted, hard-to-guess URLs.
//! Optional HTTP basic auth covers every route.

use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::{Router, middleware};
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{LibraryConfig, ServerConfig};
use crate::store::Store;
use crate::{Error, Result};

pub mod auth;
pub mod feeds;
pub mod files;

/// Read-only settings the feed handlers share.
pub struct FeedSettings {
    /// Directory holding the final media files.
    pub audio_dir: PathBuf,
    /// Salt mixed into media URL hashes.
    pub hash_salt: String,
    /// Absolute base URL to embed in feeds, overriding request headers.
    pub public_url: Option<String>,
    /// Channel image URL, if any.
    pub feed_image: Option<String>,
}

/// Shared state for the feed handlers, cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Metadata records and final media listings.
    pub store: Store,
    /// Resolved server settings.
    pub settings: Arc<FeedSettings>,
}

impl AppState {
    /// Create a new AppState.
    pub fn new(store: Store, settings: FeedSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }
}

/// Create the feed router with all route definitions.
///
/// # Routes
///
/// - `GET /` - HTML overview linking every feed
/// - `GET /individual_books` - feed of books outside any series or podcast
/// - `GET /series/:asin` - one feed per series, episodes in sequence order
/// - `GET /podcast/:asin` - one feed per podcast, episodes in sort-key order
/// - `GET /audio/:hash/:filename` - media, gated by the salted hash
pub fn create_router(store: Store, library: &LibraryConfig, server: &ServerConfig) -> Router {
    let settings = FeedSettings {
        audio_dir: library.audio_dir.clone(),
        hash_salt: server
            .hash_salt
            .clone()
            .unwrap_or_else(|| random_token(16)),
        public_url: server.public_url.clone(),
        feed_image: server.feed_image.clone(),
    };
    let state = AppState::new(store, settings);

    let router = Router::new()
        .route("/", get(feeds::overview))
        .route("/individual_books", get(feeds::individual_books))
        .route("/series/:asin", get(feeds::series_feed))
        .route("/podcast/:asin", get(feeds::podcast_feed))
        .route("/audio/:hash/:filename", get(files::serve_audio))
        .with_state(state);

    // In Axum's onion model the LAST layer applied is the OUTERMOST, so
    // auth goes on first (innermost) and tracing last.
    let credentials = auth::resolve_credentials(&server.auth);
    let router = if credentials.is_some() {
        router.layer(middleware::from_fn_with_state(
            credentials,
            auth::require_basic_auth,
        ))
    } else {
        router
    };

    router.layer(TraceLayer::new_for_http())
}

/// Start the feed server on the configured bind address.
///
/// Runs until SIGINT/SIGTERM, then finishes in-flight requests and
/// returns.
pub async fn serve(store: Store, library: &LibraryConfig, server: &ServerConfig) -> Result<()> {
    let app = create_router(store, library, server);

    let listener = TcpListener::bind(server.bind_address)
        .await
        .map_err(Error::Io)?;

    info!(address = %server.bind_address, "feed server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(crate::wait_for_signal())
        .await
        .map_err(|e| Error::FeedServer(e.to_string()))?;

    info!("feed server stopped");
    Ok(())
}

/// Random alphanumeric token for generated salts and passwords.
fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
