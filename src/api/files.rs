//! Salted media URLs and the file route behind them.
//!
//! Feed enclosures point at `/audio/<hash>/<filename>` where the hash is
//! `hex(sha256(salt + filename))`. The route recomputes the hash from the
//! requested filename and only serves on a match, which keeps media
//! unreachable without a feed in hand.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::AppState;
use super::auth::constant_time_eq;

/// Hex digest binding a relative media path to the configured salt.
pub fn salted_hash(salt: &str, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(path.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// GET /audio/:hash/:filename - one media file, gated by the salted hash.
///
/// Responds 404 for a mismatching hash or a missing file, so probing the
/// route reveals nothing about what exists. Range requests are honored,
/// which players need for seeking.
pub async fn serve_audio(
    State(state): State<AppState>,
    Path((hash, filename)): Path<(String, String)>,
    request: Request,
) -> Response {
    let expected = salted_hash(&state.settings.hash_salt, &filename);
    if !constant_time_eq(hash.as_bytes(), expected.as_bytes()) {
        return StatusCode::NOT_FOUND.into_response();
    }

    // The filename is a single path segment, so it cannot traverse out of
    // the audio directory.
    let path = state.settings.audio_dir.join(&filename);
    ServeFile::new(path).oneshot(request).await.into_response()
}
