//! DRM removal via an external remux tool.
//!
//! Conversion is a container-level copy, no re-encoding: the tool reads
//! the encrypted staging file with the key/IV from the license voucher
//! and writes a plain file into the audio directory. The staged source
//! is removed only after the plain file is in place, and the metadata
//! record is written only after both, so a record on disk always means
//! its media exists.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::config::LibraryConfig;
use crate::store::Store;
use crate::types::{BookRecord, DrmKeys};
use crate::{Error, Result};

/// Name of the remux binary discovered in `PATH`.
const REMUX_BINARY: &str = "ffmpeg";

/// Extension of staged encrypted files.
const ENCRYPTED_EXT: &str = ".aax";

/// Runs the external remux tool and promotes its output.
pub struct Converter {
    binary: PathBuf,
    staging_dir: PathBuf,
    audio_dir: PathBuf,
    store: Store,
}

impl Converter {
    /// Creates a converter with an explicit remux binary.
    pub fn new(binary: PathBuf, library: &LibraryConfig, store: Store) -> Self {
        Self {
            binary,
            staging_dir: library.download_dir.clone(),
            audio_dir: library.audio_dir.clone(),
            store,
        }
    }

    /// Discovers the remux binary in `PATH`.
    pub fn from_path(library: &LibraryConfig, store: Store) -> Result<Self> {
        let binary = which::which(REMUX_BINARY).map_err(|e| {
            Error::ExternalTool(format!("{REMUX_BINARY} not found in PATH: {e}"))
        })?;
        Ok(Self::new(binary, library, store))
    }

    /// Converts one staged file and persists its metadata record.
    ///
    /// On a non-zero tool exit the staged source is left untouched and
    /// no record is written; a later run retries the whole unit.
    pub async fn convert(
        &self,
        filename: &str,
        keys: &DrmKeys,
        record: &BookRecord,
    ) -> Result<()> {
        let source = self.staging_dir.join(filename);
        let stem = filename.strip_suffix(ENCRYPTED_EXT).unwrap_or(filename);
        let plain_tmp = self.audio_dir.join(format!("{stem}.m4a"));
        let plain_final = self.audio_dir.join(format!("{stem}.m4b"));

        tokio::fs::create_dir_all(&self.audio_dir).await?;

        debug!(source = %source.display(), "running remux tool");
        let status = Command::new(&self.binary)
            .arg("-y")
            .arg("-audible_key")
            .arg(&keys.key)
            .arg("-audible_iv")
            .arg(&keys.iv)
            .arg("-i")
            .arg(&source)
            .arg("-c")
            .arg("copy")
            .arg(&plain_tmp)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                Error::ExternalTool(format!("failed to run {}: {e}", self.binary.display()))
            })?;

        if !status.success() {
            return Err(Error::Conversion {
                path: source,
                reason: format!("remux tool exited with {status}"),
            });
        }

        // Promote the plain file first; the encrypted source survives
        // until its replacement is in place.
        tokio::fs::rename(&plain_tmp, &plain_final).await?;
        tokio::fs::remove_file(&source).await?;
        self.store.write_record(record)?;
        debug!(path = %plain_final.display(), "conversion complete");
        Ok(())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    struct ConvertFixture {
        _staging: TempDir,
        _audio: TempDir,
        _metadata: TempDir,
        library: LibraryConfig,
        store: Store,
    }

    fn fixture() -> ConvertFixture {
        let staging = TempDir::new().unwrap();
        let audio = TempDir::new().unwrap();
        let metadata = TempDir::new().unwrap();
        let library = LibraryConfig {
            audio_dir: audio.path().to_path_buf(),
            metadata_dir: metadata.path().to_path_buf(),
            download_dir: staging.path().to_path_buf(),
        };
        let store = Store::new(metadata.path(), audio.path());
        ConvertFixture {
            _staging: staging,
            _audio: audio,
            _metadata: metadata,
            library,
            store,
        }
    }

    fn stub_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-remux");
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn record(asin: &str) -> BookRecord {
        BookRecord {
            asin: asin.to_string(),
            title: "A Title".to_string(),
            lang: None,
            release_date: None,
            series: Vec::new(),
            podcasts: Vec::new(),
        }
    }

    fn keys() -> DrmKeys {
        DrmKeys {
            key: "00aa".to_string(),
            iv: "11bb".to_string(),
        }
    }

    #[tokio::test]
    async fn success_promotes_media_removes_source_and_writes_record() {
        let fx = fixture();
        let tool_dir = TempDir::new().unwrap();
        // Writes a plain file at the last argument and exits 0.
        let tool = stub_tool(
            tool_dir.path(),
            "#!/bin/sh\nfor last; do :; done\necho plain > \"$last\"\n",
        );
        let source = fx.library.download_dir.join("B0AAA00001_ACME_1_1_1.aax");
        std::fs::write(&source, "encrypted").unwrap();

        let converter = Converter::new(tool, &fx.library, fx.store.clone());
        converter
            .convert("B0AAA00001_ACME_1_1_1.aax", &keys(), &record("B0AAA00001"))
            .await
            .unwrap();

        assert!(fx.library.audio_dir.join("B0AAA00001_ACME_1_1_1.m4b").exists());
        assert!(!fx.library.audio_dir.join("B0AAA00001_ACME_1_1_1.m4a").exists());
        assert!(!source.exists());
        let raw =
            std::fs::read_to_string(fx.library.metadata_dir.join("B0AAA00001.json")).unwrap();
        assert!(raw.contains("\"asin\":\"B0AAA00001\""));
    }

    #[tokio::test]
    async fn tool_receives_keys_and_copy_arguments() {
        let fx = fixture();
        let tool_dir = TempDir::new().unwrap();
        let args_file = tool_dir.path().join("args.txt");
        let tool = stub_tool(
            tool_dir.path(),
            &format!(
                "#!/bin/sh\nprintf '%s\\n' \"$@\" > {}\nfor last; do :; done\necho plain > \"$last\"\n",
                args_file.display()
            ),
        );
        let source = fx.library.download_dir.join("B0AAA00001_ACME_1_1_1.aax");
        std::fs::write(&source, "encrypted").unwrap();

        let converter = Converter::new(tool, &fx.library, fx.store.clone());
        converter
            .convert("B0AAA00001_ACME_1_1_1.aax", &keys(), &record("B0AAA00001"))
            .await
            .unwrap();

        let args: Vec<String> = std::fs::read_to_string(&args_file)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(args[0], "-y");
        assert_eq!(&args[1..3], ["-audible_key", "00aa"]);
        assert_eq!(&args[3..5], ["-audible_iv", "11bb"]);
        assert_eq!(args[5], "-i");
        assert!(args[6].ends_with("B0AAA00001_ACME_1_1_1.aax"));
        assert_eq!(&args[7..9], ["-c", "copy"]);
        assert!(args[9].ends_with("B0AAA00001_ACME_1_1_1.m4a"));
    }

    #[tokio::test]
    async fn failure_leaves_the_source_and_writes_no_record() {
        let fx = fixture();
        let tool_dir = TempDir::new().unwrap();
        let tool = stub_tool(tool_dir.path(), "#!/bin/sh\nexit 3\n");
        let source = fx.library.download_dir.join("B0AAA00001_ACME_1_1_1.aax");
        std::fs::write(&source, "encrypted").unwrap();

        let converter = Converter::new(tool, &fx.library, fx.store.clone());
        let err = converter
            .convert("B0AAA00001_ACME_1_1_1.aax", &keys(), &record("B0AAA00001"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Conversion { .. }), "got {err}");
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "encrypted");
        assert!(!fx.library.audio_dir.join("B0AAA00001_ACME_1_1_1.m4b").exists());
        assert!(!fx.library.metadata_dir.join("B0AAA00001.json").exists());
    }

    #[tokio::test]
    async fn missing_binary_is_an_external_tool_error() {
        let fx = fixture();
        let converter = Converter::new(
            PathBuf::from("/no/such/remux-binary"),
            &fx.library,
            fx.store.clone(),
        );
        let err = converter
            .convert("B0AAA00001_ACME_1_1_1.aax", &keys(), &record("B0AAA00001"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExternalTool(_)), "got {err}");
    }
}
