//! Three-stage acquisition pipeline.
//!
//! The orchestrator enumerates the owned library, decides which titles
//! still need acquiring, licenses each admitted title inline, and hands
//! the resulting units through three long-lived stage workers:
//!
//! ```text
//! enumerate/admit -> [metadata] -> [download] -> [convert]
//! ```
//!
//! Stages are connected by bounded channels of capacity one, so at most
//! one unit sits between any two stages and a slow stage backpressures
//! everything upstream. Termination is channel closure: the admitter
//! drops its sender when enumeration ends, each worker exits when its
//! receiver drains, and dropping the worker's own sender cascades the
//! shutdown downstream. Every admitted unit reaches the terminal stage
//! exactly once.
//!
//! Failure policy: an enumeration failure aborts the run (a partial
//! listing is not trusted); everything else is local to one title,
//! logged, and skipped.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::store::{self, Store};
use crate::types::ProcessingUnit;
use crate::vendor::{self, VendorClient, VoucherDecryptor};
use crate::Result;

pub mod convert;
pub mod download;

pub use convert::Converter;
pub use download::Downloader;

/// Capacity of the channels between stages. One unit in flight per
/// handoff bounds memory to the pipeline depth regardless of catalog
/// size.
const STAGE_CAPACITY: usize = 1;

/// Wires the stages together and drives a whole acquisition run.
pub struct Pipeline {
    client: Arc<dyn VendorClient>,
    decryptor: Arc<dyn VoucherDecryptor>,
    store: Store,
    downloader: Arc<Downloader>,
    converter: Arc<Converter>,
}

impl Pipeline {
    /// Assembles a pipeline from its collaborators.
    pub fn new(
        client: Arc<dyn VendorClient>,
        decryptor: Arc<dyn VoucherDecryptor>,
        store: Store,
        downloader: Downloader,
        converter: Converter,
    ) -> Self {
        Self {
            client,
            decryptor,
            store,
            downloader: Arc::new(downloader),
            converter: Arc::new(converter),
        }
    }

    /// Runs one full acquisition pass over the owned library.
    ///
    /// The local state snapshots for the admission rule are taken once,
    /// before any stage starts, so concurrent stage writes cannot shift
    /// admission decisions mid-run.
    pub async fn run(&self) -> Result<()> {
        let known = self.store.known_asins()?;
        let audio_files = self.store.audio_files()?;

        let (metadata_tx, metadata_rx) = mpsc::channel(STAGE_CAPACITY);
        let (download_tx, download_rx) = mpsc::channel(STAGE_CAPACITY);
        let (convert_tx, convert_rx) = mpsc::channel(STAGE_CAPACITY);

        let metadata_worker = tokio::spawn(metadata_stage(
            Arc::clone(&self.client),
            metadata_rx,
            download_tx,
        ));
        let download_worker = tokio::spawn(download_stage(
            Arc::clone(&self.downloader),
            download_rx,
            convert_tx,
        ));
        let convert_worker = tokio::spawn(convert_stage(Arc::clone(&self.converter), convert_rx));

        // metadata_tx moves into the admitter and drops when it returns,
        // which starts the shutdown cascade through the stages.
        let admitted = self
            .admit_new_titles(&known, &audio_files, metadata_tx)
            .await;

        for (stage, worker) in [
            ("metadata", metadata_worker),
            ("download", download_worker),
            ("convert", convert_worker),
        ] {
            if let Err(e) = worker.await {
                error!(stage, error = %e, "pipeline stage ended abnormally");
            }
        }

        let admitted = admitted?;
        info!(admitted, "acquisition run complete");
        Ok(())
    }

    /// Enumerates the owned library and queues every title that still
    /// needs acquiring.
    ///
    /// Returns the number of admitted titles, or the enumeration error
    /// that cut the run short.
    async fn admit_new_titles(
        &self,
        known: &HashSet<String>,
        audio_files: &[String],
        queue: mpsc::Sender<ProcessingUnit>,
    ) -> Result<usize> {
        let mut admitted = 0usize;
        let mut page = 1u32;

        'pages: loop {
            let asins = self.client.library_page(page).await?;
            if asins.is_empty() {
                break;
            }
            page += 1;

            for asin in asins {
                debug!(asin = %asin, "checking");
                if known.contains(&asin) && store::find_final_media(&asin, audio_files).is_some() {
                    continue;
                }

                let grant = match vendor::acquire_license(
                    self.client.as_ref(),
                    self.decryptor.as_ref(),
                    &asin,
                )
                .await
                {
                    Ok(grant) => grant,
                    Err(e) => {
                        warn!(asin = %asin, error = %e, "license acquisition failed, skipping title");
                        continue;
                    }
                };

                let unit = ProcessingUnit {
                    asin,
                    record: None,
                    download_url: Some(grant.url),
                    filename: Some(grant.filename),
                    voucher: Some(grant.keys),
                };
                if queue.send(unit).await.is_err() {
                    warn!("metadata stage stopped accepting work");
                    break 'pages;
                }
                admitted += 1;
            }
        }

        Ok(admitted)
    }

    /// Re-fetches and rewrites metadata records for every title already
    /// in the local store, without touching media.
    pub async fn refresh_metadata(&self) -> Result<()> {
        let known = self.store.known_asins()?;

        let (metadata_tx, metadata_rx) = mpsc::channel(STAGE_CAPACITY);
        let (writer_tx, writer_rx) = mpsc::channel(STAGE_CAPACITY);

        let metadata_worker = tokio::spawn(metadata_stage(
            Arc::clone(&self.client),
            metadata_rx,
            writer_tx,
        ));
        let writer_worker = tokio::spawn(writer_stage(self.store.clone(), writer_rx));

        let mut refreshed = 0usize;
        for asin in known {
            debug!(asin = %asin, "refreshing");
            if metadata_tx.send(ProcessingUnit::bare(asin)).await.is_err() {
                warn!("metadata stage stopped accepting work");
                break;
            }
            refreshed += 1;
        }
        drop(metadata_tx);

        for (stage, worker) in [("metadata", metadata_worker), ("writer", writer_worker)] {
            if let Err(e) = worker.await {
                error!(stage, error = %e, "pipeline stage ended abnormally");
            }
        }

        info!(refreshed, "metadata refresh complete");
        Ok(())
    }
}

/// Fills in the normalized record for each unit.
///
/// A failed lookup drops the unit here; nothing downstream can do
/// useful work without a record, and the title is retried on the next
/// run.
async fn metadata_stage(
    client: Arc<dyn VendorClient>,
    mut input: mpsc::Receiver<ProcessingUnit>,
    output: mpsc::Sender<ProcessingUnit>,
) {
    while let Some(mut unit) = input.recv().await {
        match vendor::fetch_book_record(client.as_ref(), &unit.asin).await {
            Ok(record) => {
                unit.record = Some(record);
                if output.send(unit).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(asin = %unit.asin, error = %e, "metadata lookup failed, dropping title");
            }
        }
    }
}

/// Transfers the licensed media for each unit into staging.
///
/// Download failures are already logged and swallowed inside the
/// downloader; the unit is forwarded regardless and the converter
/// surfaces the missing file.
async fn download_stage(
    downloader: Arc<Downloader>,
    mut input: mpsc::Receiver<ProcessingUnit>,
    output: mpsc::Sender<ProcessingUnit>,
) {
    while let Some(unit) = input.recv().await {
        let (Some(url), Some(filename)) = (unit.download_url.as_deref(), unit.filename.as_deref())
        else {
            warn!(asin = %unit.asin, "unit has no download grant, dropping");
            continue;
        };
        let title = unit
            .record
            .as_ref()
            .map_or(unit.asin.as_str(), |r| r.title.as_str());
        info!(asin = %unit.asin, title = %title, "downloading");
        downloader.fetch(url, filename).await;

        if output.send(unit).await.is_err() {
            break;
        }
    }
}

/// Terminal stage: strips DRM and persists the metadata record.
async fn convert_stage(converter: Arc<Converter>, mut input: mpsc::Receiver<ProcessingUnit>) {
    while let Some(unit) = input.recv().await {
        let asin = unit.asin;
        let (Some(record), Some(keys), Some(filename)) = (unit.record, unit.voucher, unit.filename)
        else {
            warn!(asin = %asin, "unit reached conversion incomplete, dropping");
            continue;
        };
        if let Err(e) = converter.convert(&filename, &keys, &record).await {
            error!(asin = %asin, error = %e, "conversion failed");
        }
    }
}

/// Sink of the refresh variant: rewrites the stored record.
async fn writer_stage(store: Store, mut input: mpsc::Receiver<ProcessingUnit>) {
    while let Some(unit) = input.recv().await {
        let Some(record) = unit.record else {
            warn!(asin = %unit.asin, "no record to write, skipping");
            continue;
        };
        if let Err(e) = store.write_record(&record) {
            error!(asin = %unit.asin, error = %e, "failed to write metadata record");
        }
    }
}
