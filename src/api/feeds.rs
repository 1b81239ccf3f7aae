//! RSS feed construction and the HTML overview.
//!
//! Every feed is rebuilt from the store on each request; with a library of
//! a few hundred records that is a handful of small file reads, and it
//! means a freshly converted book shows up on the next poll without any
//! cache invalidation.

use axum::extract::{Host, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rss::{ChannelBuilder, EnclosureBuilder, GuidBuilder, ImageBuilder, ItemBuilder};
use tracing::warn;

use super::AppState;
use super::files::salted_hash;
use crate::store::{BookGroup, StoredBook};

/// Enclosure MIME type podcast apps expect for AAC audiobooks.
const AUDIO_MIME: &str = "audio/x-m4a";

const FEED_DESCRIPTION: &str = "Audiobooks provided as a Podcast Feed for use in Podcast Apps";

/// How item publication dates are derived.
///
/// Podcast apps order episodes by pubDate, so the dates must track content
/// newness: a book's release date, stepped forward one minute per list
/// position in grouped feeds so same-day releases keep their group order.
enum DateScheme {
    /// Each item carries its release date unchanged.
    Release,
    /// Release date plus one minute per list position.
    Stepped,
}

/// Publication instant for a `YYYY-MM-DD` release date.
///
/// A missing or malformed date anchors at the Unix epoch; the item still
/// appears in the feed, dated before anything with a real release date.
fn release_instant(release_date: Option<&str>) -> DateTime<Utc> {
    release_date
        .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// GET / - HTML overview linking every feed.
pub async fn overview(State(state): State<AppState>) -> Response {
    let view = match state.store.library_view() {
        Ok(view) => view,
        Err(e) => return library_error(&e),
    };

    let mut page = String::new();
    page.push_str("<!DOCTYPE html>\n<html><head><title>Audiobook feeds</title></head><body>\n");
    page.push_str("<h1>Audiobook feeds</h1>\n");
    page.push_str("<p><a href=\"/individual_books\">Books not in any series</a></p>\n");

    page.push_str("<h2>Series</h2>\n<ul>\n");
    for group in &view.series {
        page.push_str(&format!(
            "<li><a href=\"/series/{}\">{}</a></li>\n",
            group.asin,
            html_escape(&group.title)
        ));
    }
    page.push_str("</ul>\n<h2>Podcasts</h2>\n<ul>\n");
    for group in &view.podcasts {
        page.push_str(&format!(
            "<li><a href=\"/podcast/{}\">{}</a></li>\n",
            group.asin,
            html_escape(&group.title)
        ));
    }
    page.push_str("</ul>\n</body></html>\n");

    Html(page).into_response()
}

/// GET /individual_books - one feed of every standalone book.
pub async fn individual_books(
    State(state): State<AppState>,
    Host(host): Host,
    headers: HeaderMap,
) -> Response {
    let view = match state.store.library_view() {
        Ok(view) => view,
        Err(e) => return library_error(&e),
    };
    let base = external_base(&state, &host, &headers);
    feed_response(
        &state,
        &base,
        "Audiobooks not in any series",
        &view.individual,
        DateScheme::Release,
    )
}

/// GET /series/:asin - one series as a feed, episodes in sequence order.
pub async fn series_feed(
    State(state): State<AppState>,
    Path(asin): Path<String>,
    Host(host): Host,
    headers: HeaderMap,
) -> Response {
    let view = match state.store.library_view() {
        Ok(view) => view,
        Err(e) => return library_error(&e),
    };
    group_feed(&state, &host, &headers, view.series_by_asin(&asin))
}

/// GET /podcast/:asin - one podcast as a feed, episodes in sort-key order.
pub async fn podcast_feed(
    State(state): State<AppState>,
    Path(asin): Path<String>,
    Host(host): Host,
    headers: HeaderMap,
) -> Response {
    let view = match state.store.library_view() {
        Ok(view) => view,
        Err(e) => return library_error(&e),
    };
    group_feed(&state, &host, &headers, view.podcast_by_asin(&asin))
}

fn group_feed(
    state: &AppState,
    host: &str,
    headers: &HeaderMap,
    group: Option<&BookGroup>,
) -> Response {
    let Some(group) = group else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let base = external_base(state, host, headers);
    feed_response(state, &base, &group.title, &group.books, DateScheme::Stepped)
}

/// Renders one group of books as an RSS 2.0 document.
///
/// Books without a converted media file on disk are left out; they join
/// the feed once the pipeline finishes them.
fn feed_response(
    state: &AppState,
    base: &str,
    title: &str,
    books: &[StoredBook],
    scheme: DateScheme,
) -> Response {
    let mut items = Vec::new();
    for book in books {
        let Some(file) = &book.audio_file else {
            continue;
        };
        let byte_size = match std::fs::metadata(state.settings.audio_dir.join(file)) {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(file = %file, error = %e, "media file unreadable, leaving out of feed");
                continue;
            }
        };

        let url = format!(
            "{base}/audio/{}/{file}",
            salted_hash(&state.settings.hash_salt, file)
        );
        let released = release_instant(book.release_date.as_deref());
        let pub_date = match scheme {
            DateScheme::Release => released,
            DateScheme::Stepped => released + Duration::minutes(items.len() as i64),
        }
        .to_rfc2822();

        let enclosure = EnclosureBuilder::default()
            .url(url)
            .length(byte_size.to_string())
            .mime_type(AUDIO_MIME)
            .build();
        let guid = GuidBuilder::default()
            .value(book.asin.clone())
            .permalink(false)
            .build();
        items.push(
            ItemBuilder::default()
                .title(Some(book.title.clone()))
                .enclosure(Some(enclosure))
                .guid(Some(guid))
                .pub_date(Some(pub_date))
                .build(),
        );
    }

    let mut channel = ChannelBuilder::default();
    channel
        .title(title)
        .link(base.to_string())
        .description(FEED_DESCRIPTION)
        .items(items);
    if let Some(image) = &state.settings.feed_image {
        channel.image(Some(
            ImageBuilder::default()
                .url(image.clone())
                .title(title)
                .link(base.to_string())
                .build(),
        ));
    }

    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}",
        channel.build()
    );
    (
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        body,
    )
        .into_response()
}

/// Absolute URL prefix for media links: the configured public URL when
/// set, otherwise reconstructed from the request headers.
fn external_base(state: &AppState, host: &str, headers: &HeaderMap) -> String {
    if let Some(url) = &state.settings.public_url {
        return url.trim_end_matches('/').to_string();
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    format!("{scheme}://{host}")
}

fn library_error(e: &crate::Error) -> Response {
    warn!(error = %e, "failed to read the library");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
