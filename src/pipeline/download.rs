//! Resumable media download into the staging directory.
//!
//! Transfers converge across runs: a completed file is verified by size
//! and never re-fetched, a partial transfer resumes from where it
//! stopped, and only a fully streamed file is promoted to its final
//! staging name. Errors are logged and swallowed; the converter stage
//! simply finds no file and the title is retried on a later run.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::config::{DownloadConfig, LibraryConfig};
use crate::vendor;
use crate::Result;

/// Suffix of the working file while a transfer is incomplete.
const PART_SUFFIX: &str = ".part";

/// Streams licensed media files into the staging directory.
pub struct Downloader {
    http: reqwest::Client,
    staging_dir: PathBuf,
    chunk_size: usize,
}

impl Downloader {
    /// Creates a downloader writing into the configured staging
    /// directory.
    ///
    /// The HTTP client carries the media User-Agent and no overall
    /// request timeout; a full audiobook transfer legitimately takes
    /// longer than any sane fixed deadline.
    pub fn new(library: &LibraryConfig, download: &DownloadConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(vendor::USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            staging_dir: library.download_dir.clone(),
            chunk_size: download.chunk_size,
        })
    }

    /// Absolute path of a staged file.
    pub fn staging_path(&self, filename: &str) -> PathBuf {
        self.staging_dir.join(filename)
    }

    /// Transfers `url` to `<staging>/<filename>`, resuming a partial
    /// transfer when one is present.
    ///
    /// Never returns an error: failures are logged with the URL and the
    /// partial file is left in place for the next run.
    pub async fn fetch(&self, url: &str, filename: &str) {
        if let Err(e) = self.try_fetch(url, filename).await {
            error!(url = %url, error = %e, "download failed");
        }
    }

    async fn try_fetch(&self, url: &str, filename: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let final_path = self.staging_path(filename);
        let part_path = self.staging_dir.join(format!("{filename}{PART_SUFFIX}"));

        if self.already_complete(url, &final_path).await {
            return Ok(());
        }

        let resume_from = match tokio::fs::metadata(&part_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.http.get(url);
        if resume_from > 0 {
            debug!(url = %url, offset = resume_from, "resuming partial download");
            request = request.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
        }
        let response = request.send().await?.error_for_status()?;

        // A server is free to ignore the Range header and answer 200 with
        // the full body; append only on an actual partial response.
        let appending =
            resume_from > 0 && response.status() == reqwest::StatusCode::PARTIAL_CONTENT;
        if resume_from > 0 && !appending {
            debug!(url = %url, "server ignored the range request, restarting the transfer");
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.create(true);
        if appending {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }
        let file = options.open(&part_path).await?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.chunk_size, file);

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            writer.write_all(&chunk?).await?;
        }
        writer.flush().await?;

        // Only a fully streamed file ever reaches the final name.
        tokio::fs::rename(&part_path, &final_path).await?;
        debug!(url = %url, path = %final_path.display(), "download complete");
        Ok(())
    }

    /// Checks whether the final file already holds the full content.
    ///
    /// A probe failure is logged and treated as unverified, so the
    /// transfer falls through to a fresh download.
    async fn already_complete(&self, url: &str, final_path: &Path) -> bool {
        let Ok(meta) = tokio::fs::metadata(final_path).await else {
            return false;
        };
        match self.probe_length(url).await {
            Ok(expected) if meta.len() == expected => {
                info!(path = %final_path.display(), "file already complete, skipping download");
                true
            }
            Ok(expected) => {
                debug!(
                    path = %final_path.display(),
                    on_disk = meta.len(),
                    expected,
                    "existing file size differs, downloading again"
                );
                false
            }
            Err(e) => {
                error!(url = %url, error = %e, "cannot verify existing file");
                false
            }
        }
    }

    async fn probe_length(&self, url: &str) -> Result<u64> {
        let response = self.http.head(url).send().await?.error_for_status()?;
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        Ok(length)
    }
}
