//! Core types shared across bookcast modules

use serde::{Deserialize, Serialize};

/// One series a title belongs to, reduced to what the display layer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRef {
    /// Identifier of the series itself
    pub asin: String,
    /// Series title
    pub title: String,
    /// Position of this title within the series ("1", "2.5", ...)
    pub sequence: Option<String>,
}

/// The podcast parent a title belongs to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodcastRef {
    /// Identifier of the podcast-parent title
    pub asin: String,
    /// Podcast title
    pub title: String,
    /// Episode ordering key, a string-encoded ordinal, not necessarily integral
    pub sort: Option<String>,
}

/// Normalized metadata record, persisted as `metadata/<asin>.json`
/// (wrapped in a single `product` field, see [`crate::store`]).
///
/// This is the single source of truth the feed layer regroups by series and
/// podcast membership. Empty membership lists are omitted from the persisted
/// form, matching records written by earlier versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    /// Vendor-assigned identifier; filename stem and join key everywhere
    pub asin: String,
    /// Display title
    pub title: String,
    /// Language name as reported by the vendor
    pub lang: Option<String>,
    /// Release date as reported by the vendor (ISO date string)
    pub release_date: Option<String>,
    /// Series memberships, possibly empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SeriesRef>,
    /// Podcast-parent membership; at most one entry
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub podcasts: Vec<PodcastRef>,
}

impl BookRecord {
    /// True when the title belongs to no series and no podcast, so it is
    /// presented as an individual book.
    pub fn is_standalone(&self) -> bool {
        self.series.is_empty() && self.podcasts.is_empty()
    }
}

/// Symmetric key and IV obtained from a decrypted license voucher,
/// passed verbatim to the remux tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrmKeys {
    /// Hex-encoded AES key
    pub key: String,
    /// Hex-encoded initialization vector
    pub iv: String,
}

/// The unit of work flowing through the acquisition pipeline.
///
/// Created once per admitted identifier; each stage fills in one of the
/// optional fields and hands the unit downstream. The terminal stage drops
/// it, successfully converted or not.
#[derive(Debug, Clone)]
pub struct ProcessingUnit {
    /// The identifier this unit acquires
    pub asin: String,
    /// Filled by the metadata stage
    pub record: Option<BookRecord>,
    /// Filled by license acquisition, before queue admission
    pub download_url: Option<String>,
    /// Staging filename (`<asin>_<FINGERPRINT>.aax`), assigned with the license
    pub filename: Option<String>,
    /// Key/IV from the decrypted voucher
    pub voucher: Option<DrmKeys>,
}

impl ProcessingUnit {
    /// A unit carrying only its identifier, as used by the metadata refresh
    /// variant where no license or transfer happens.
    pub fn bare(asin: impl Into<String>) -> Self {
        Self {
            asin: asin.into(),
            record: None,
            download_url: None,
            filename: None,
            voucher: None,
        }
    }
}
