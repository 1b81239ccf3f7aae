//! On-disk metadata store and display grouping.
//!
//! One JSON file per title under the metadata directory, wrapped in a
//! `{"product": ...}` envelope. The store is also where the library is
//! regrouped for display: standalone books, series keyed by series
//! identifier, and podcasts keyed by parent identifier.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

use crate::types::BookRecord;
use crate::Result;

/// Serialized envelope around a stored record.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct RecordEnvelope {
    product: BookRecord,
}

/// A stored title prepared for display.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBook {
    /// Title identifier.
    pub asin: String,
    /// Display title.
    pub title: String,
    /// Release date string, when the record carries one.
    pub release_date: Option<String>,
    /// Final media filename in the audio directory, when present.
    pub audio_file: Option<String>,
}

/// A series or podcast with its member titles in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct BookGroup {
    /// Group identifier (series or podcast-parent).
    pub asin: String,
    /// Group display title.
    pub title: String,
    /// Members in display order.
    pub books: Vec<StoredBook>,
}

/// The whole stored library, regrouped for display.
#[derive(Debug, Clone, Default)]
pub struct LibraryView {
    /// Titles that belong to no series and no podcast, ordered by title.
    pub individual: Vec<StoredBook>,
    /// Series groups ordered by title.
    pub series: Vec<BookGroup>,
    /// Podcast groups ordered by title.
    pub podcasts: Vec<BookGroup>,
}

impl LibraryView {
    /// Looks up a series group by its identifier.
    pub fn series_by_asin(&self, asin: &str) -> Option<&BookGroup> {
        self.series.iter().find(|g| g.asin == asin)
    }

    /// Looks up a podcast group by its parent identifier.
    pub fn podcast_by_asin(&self, asin: &str) -> Option<&BookGroup> {
        self.podcasts.iter().find(|g| g.asin == asin)
    }
}

/// Access to the metadata and audio directories.
#[derive(Debug, Clone)]
pub struct Store {
    metadata_dir: PathBuf,
    audio_dir: PathBuf,
}

impl Store {
    /// Creates a store over the two library directories.
    pub fn new(metadata_dir: impl Into<PathBuf>, audio_dir: impl Into<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            audio_dir: audio_dir.into(),
        }
    }

    /// Absolute path of a file in the audio directory.
    pub fn audio_path(&self, filename: &str) -> PathBuf {
        self.audio_dir.join(filename)
    }

    /// Persists `record` as `<asin>.json` in the metadata directory.
    pub fn write_record(&self, record: &BookRecord) -> Result<()> {
        let envelope = RecordEnvelope {
            product: record.clone(),
        };
        let path = self.metadata_dir.join(format!("{}.json", record.asin));
        fs::write(&path, serde_json::to_vec(&envelope)?)?;
        Ok(())
    }

    /// Identifiers with a stored metadata record.
    ///
    /// Recomputed from the directory on every call so it always reflects
    /// current on-disk state. Auxiliary files whose names start with
    /// `series` or `content` are not records and are skipped.
    pub fn known_asins(&self) -> Result<HashSet<String>> {
        let mut asins = HashSet::new();
        for entry in fs::read_dir(&self.metadata_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_record_filename(name) {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".json") {
                asins.insert(stem.to_string());
            }
        }
        Ok(asins)
    }

    /// Filenames currently present in the audio directory.
    pub fn audio_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.audio_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                files.push(name.to_string());
            }
        }
        Ok(files)
    }

    /// Loads every stored record and regroups the library for display.
    ///
    /// Unreadable or malformed record files are logged and skipped; one
    /// bad file never hides the rest of the library.
    pub fn library_view(&self) -> Result<LibraryView> {
        let audio = self.audio_files()?;
        let mut individual = Vec::new();
        let mut series: BTreeMap<String, (String, Vec<(Option<String>, StoredBook)>)> =
            BTreeMap::new();
        let mut podcasts: BTreeMap<String, (String, Vec<(Option<String>, StoredBook)>)> =
            BTreeMap::new();

        for entry in fs::read_dir(&self.metadata_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !is_record_filename(name) {
                continue;
            }

            let record = match read_envelope(&entry.path()) {
                Ok(record) => record,
                Err(e) => {
                    warn!(file = %name, error = %e, "skipping unreadable metadata record");
                    continue;
                }
            };
            let book = StoredBook {
                asin: record.asin.clone(),
                title: record.title.clone(),
                release_date: record.release_date.clone(),
                audio_file: find_final_media(&record.asin, &audio).map(str::to_string),
            };

            for membership in &record.series {
                let group = series
                    .entry(membership.asin.clone())
                    .or_insert_with(|| (membership.title.clone(), Vec::new()));
                group.1.push((membership.sequence.clone(), book.clone()));
            }
            for membership in &record.podcasts {
                let group = podcasts
                    .entry(membership.asin.clone())
                    .or_insert_with(|| (membership.title.clone(), Vec::new()));
                group.1.push((membership.sort.clone(), book.clone()));
            }
            if record.is_standalone() {
                individual.push(book);
            }
        }

        individual.sort_by(|a, b| a.title.cmp(&b.title));

        let series = series
            .into_iter()
            .map(|(asin, (title, mut members))| {
                members.sort_by(|a, b| {
                    numeric_order_key(a.0.as_deref())
                        .total_cmp(&numeric_order_key(b.0.as_deref()))
                        .then_with(|| a.1.title.cmp(&b.1.title))
                });
                BookGroup {
                    asin,
                    title,
                    books: members.into_iter().map(|(_, book)| book).collect(),
                }
            })
            .collect::<Vec<_>>();

        let podcasts = podcasts
            .into_iter()
            .map(|(asin, (title, mut members))| {
                // Ascending, so list position tracks episode newness.
                members.sort_by(|a, b| {
                    numeric_order_key(a.0.as_deref())
                        .total_cmp(&numeric_order_key(b.0.as_deref()))
                        .then_with(|| a.1.title.cmp(&b.1.title))
                });
                BookGroup {
                    asin,
                    title,
                    books: members.into_iter().map(|(_, book)| book).collect(),
                }
            })
            .collect::<Vec<_>>();

        let mut view = LibraryView {
            individual,
            series,
            podcasts,
        };
        view.series.sort_by(|a, b| a.title.cmp(&b.title));
        view.podcasts.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(view)
    }
}

/// Finds the final media file for a title in an audio-directory listing.
///
/// Matches the `<prefix>_<asin>_<fingerprint>.m4b` convention the
/// converter produces, and the bare `<asin>.m4b` stem. Returns the first
/// match in listing order.
pub fn find_final_media<'a>(asin: &str, files: &'a [String]) -> Option<&'a str> {
    let exact = format!("{asin}.m4b");
    let pattern = Regex::new(&format!(r"^.*_?{}_.*\.m4b$", regex::escape(asin))).ok()?;
    files
        .iter()
        .map(String::as_str)
        .find(|f| *f == exact || pattern.is_match(f))
}

fn is_record_filename(name: &str) -> bool {
    name.ends_with(".json") && !name.starts_with("series") && !name.starts_with("content")
}

fn read_envelope(path: &Path) -> Result<BookRecord> {
    let raw = fs::read_to_string(path)?;
    let envelope: RecordEnvelope = serde_json::from_str(&raw)?;
    Ok(envelope.product)
}

/// Series sequences and podcast sort keys order numerically; missing or
/// unparseable ones go last.
fn numeric_order_key(value: Option<&str>) -> f64 {
    value
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(f64::INFINITY)
}
