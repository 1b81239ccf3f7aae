//! Configuration types for bookcast

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Library directory layout (audio, metadata, staging downloads)
///
/// Groups the three filesystem areas the pipeline reads and writes.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Final media directory holding DRM-free `.m4b` files (default: "./audiobooks")
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    /// Metadata directory holding one JSON record per title (default: "./metadata")
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,

    /// Staging directory for encrypted downloads (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            metadata_dir: default_metadata_dir(),
            download_dir: default_download_dir(),
        }
    }
}

/// Vendor API access (base URL, session file, request timeout)
///
/// The session file is produced by an external registration flow and carries
/// the access token the client attaches to every request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VendorConfig {
    /// Vendor API base URL (default: "https://api.audible.com")
    #[serde(default = "default_vendor_base_url")]
    pub base_url: String,

    /// Path to the JSON session file with the access token (default: "./auth.json")
    #[serde(default = "default_auth_file")]
    pub auth_file: PathBuf,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: default_vendor_base_url(),
            auth_file: default_auth_file(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Media transfer tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Streaming chunk size in bytes (default: 1 MiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

/// Basic-auth settings for the feed server
///
/// When enabled without a configured password, a random one is generated at
/// startup and logged with a warning so the server never runs open by
/// accident.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedAuthConfig {
    /// Require basic auth on all feed routes (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Basic-auth username (default: "user")
    #[serde(default = "default_username")]
    pub username: String,

    /// Basic-auth password (None = generate a random one at startup)
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for FeedAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            username: default_username(),
            password: None,
        }
    }
}

/// Feed server settings (bind address, public URL, feed appearance, auth)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the feed server binds to (default: "0.0.0.0:8000")
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Public base URL embedded in feeds; when None the request's
    /// Host / X-Forwarded-* headers are used instead
    #[serde(default)]
    pub public_url: Option<String>,

    /// Cover image URL attached to every feed
    #[serde(default)]
    pub feed_image: Option<String>,

    /// Salt for hashed media URLs (None = random per process start;
    /// previously issued URLs stop working after a restart)
    #[serde(default)]
    pub hash_salt: Option<String>,

    /// Basic-auth settings
    #[serde(default)]
    pub auth: FeedAuthConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: None,
            feed_image: None,
            hash_salt: None,
            auth: FeedAuthConfig::default(),
        }
    }
}

/// Main configuration for bookcast
///
/// Fields are organized into logical sub-configs:
/// - [`library`](LibraryConfig): the three filesystem areas
/// - [`vendor`](VendorConfig): API base URL, session file, timeouts
/// - [`download`](DownloadConfig): transfer tuning
/// - [`server`](ServerConfig): feed server
///
/// Every component receives the sub-config it needs at construction; there is
/// no process-wide mutable configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Filesystem areas (audio, metadata, staging)
    #[serde(default)]
    pub library: LibraryConfig,

    /// Vendor API access
    #[serde(default)]
    pub vendor: VendorConfig,

    /// Media transfer tuning
    #[serde(default)]
    pub download: DownloadConfig,

    /// Feed server settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// A missing file is a configuration error; callers that want "defaults
    /// unless a file exists" check existence first (the CLI does).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| crate::Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        toml::from_str(&raw).map_err(|e| crate::Error::Config {
            message: format!("cannot parse {}: {}", path.display(), e),
            key: None,
        })
    }
}

// Default value functions

fn default_audio_dir() -> PathBuf {
    PathBuf::from("./audiobooks")
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("./metadata")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_vendor_base_url() -> String {
    "https://api.audible.com".to_string()
}

fn default_auth_file() -> PathBuf {
    PathBuf::from("./auth.json")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_chunk_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_true() -> bool {
    true
}

fn default_username() -> String {
    "user".to_string()
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
