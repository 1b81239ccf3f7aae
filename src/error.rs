//! Error types for bookcast
//!
//! This module provides error handling for the whole crate:
//! - Run-fatal errors (catalog enumeration transport failure, bad configuration)
//! - Per-title errors (metadata lookup, license acquisition, transfer, conversion)
//!   that the pipeline logs and skips rather than propagates
//! - Ambient errors (I/O, serialization, feed server)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bookcast operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bookcast
///
/// Per-title variants (`MetadataUnavailable`, `License`, `Download`,
/// `Conversion`) carry the identifier or path they concern so a skipped title
/// can be found again from the log line alone.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "library.audio_dir")
        key: Option<String>,
    },

    /// Network or HTTP failure talking to the vendor or the media host
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Neither the owned-library nor the catalog lookup produced a usable record
    #[error("metadata unavailable for {asin}: {reason}")]
    MetadataUnavailable {
        /// The identifier whose lookups failed
        asin: String,
        /// What went wrong on the last attempted endpoint
        reason: String,
    },

    /// License request failed, or the voucher could not be decrypted
    #[error("license error for {asin}: {reason}")]
    License {
        /// The identifier whose license request failed
        asin: String,
        /// The underlying request or decryption failure
        reason: String,
    },

    /// Media transfer failed or could not be verified
    #[error("download error for {url}: {reason}")]
    Download {
        /// The source URL of the failed transfer
        url: String,
        /// The underlying network or filesystem failure
        reason: String,
    },

    /// External remux tool exited non-zero or produced no output
    #[error("conversion failed for {}: {reason}", .path.display())]
    Conversion {
        /// The encrypted input file that could not be converted
        path: PathBuf,
        /// Tool exit status and captured stderr
        reason: String,
    },

    /// External tool missing or not executable (ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Vendor session could not be established (auth file missing or invalid)
    #[error("session error: {0}")]
    Session(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Feed server error (bind failure, serve loop failure)
    #[error("feed server error: {0}")]
    FeedServer(String),
}

impl Error {
    /// Shorthand for a `MetadataUnavailable` with a formatted reason.
    pub fn metadata_unavailable(asin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MetadataUnavailable {
            asin: asin.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `License` error with a formatted reason.
    pub fn license(asin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::License {
            asin: asin.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a `Download` error with a formatted reason.
    pub fn download(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Download {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Helpers: construct every per-title and setup variant for display tests
    // -----------------------------------------------------------------------

    /// Returns (Error, expected Display substring) for every variant
    /// constructible without a live reqwest error.
    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "audio_dir is not a directory".into(),
                    key: Some("library.audio_dir".into()),
                },
                "configuration error: audio_dir is not a directory",
            ),
            (
                Error::metadata_unavailable("B004V9OF6Y", "owned 404, catalog 404"),
                "metadata unavailable for B004V9OF6Y",
            ),
            (
                Error::license("B004V9OF6Y", "no offline url in response"),
                "license error for B004V9OF6Y",
            ),
            (
                Error::download("https://cds.example/file.aax", "connection reset"),
                "download error for https://cds.example/file.aax",
            ),
            (
                Error::Conversion {
                    path: PathBuf::from("/tmp/B004V9OF6Y_LC_64_22050_2.aax"),
                    reason: "exit status 1".into(),
                },
                "conversion failed for /tmp/B004V9OF6Y_LC_64_22050_2.aax",
            ),
            (
                Error::ExternalTool("ffmpeg not found in PATH".into()),
                "external tool error: ffmpeg not found in PATH",
            ),
            (
                Error::Session("auth file /etc/bookcast/auth.json missing".into()),
                "session error",
            ),
            (
                Error::Io(std::io::Error::other("disk fail")),
                "I/O error: disk fail",
            ),
            (
                Error::FeedServer("bind failed".into()),
                "feed server error: bind failed",
            ),
        ]
    }

    #[test]
    fn every_variant_displays_its_context() {
        for (error, expected_substring) in all_error_variants() {
            let display = error.to_string();
            assert!(
                display.contains(expected_substring),
                "expected {display:?} to contain {expected_substring:?}"
            );
        }
    }

    #[test]
    fn per_title_errors_carry_the_identifier() {
        let err = Error::metadata_unavailable("B07B6L2N23", "schema mismatch");
        assert!(err.to_string().contains("B07B6L2N23"));

        let err = Error::license("B07B6L2N23", "voucher missing key");
        assert!(err.to_string().contains("B07B6L2N23"));
    }

    #[test]
    fn io_errors_convert_via_from() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn serde_errors_convert_via_from() {
        let bad = serde_json::from_str::<serde_json::Value>("{not json");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
