//! Artifact retrieval.
//!
//! The rest of the system only ever wants "a local directory holding the
//! application files"; where those files come from (an artifact store over
//! HTTP, or the request body itself) is this module's concern, behind the
//! [`Fetcher`] trait so deployments can be tested without network access.

use std::fs;
use std::io::{Cursor, Read};

use anyhow::{Context, Result, anyhow};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

/// Trait for resolving deployment artifacts to a local directory.
///
/// Implementations must be `Send + Sync`: the fetcher is shared with actions
/// that run set-up before fan-out.
pub trait Fetcher: Send + Sync {
    /// Downloads the artifact at `url`, extracts it, and returns the local
    /// directory. When `manifest` is non-empty it is written into the
    /// directory as `manifest.yml`, replacing any packaged one.
    fn fetch(&self, url: &str, manifest: &str) -> Result<Utf8PathBuf>;

    /// Extracts a zip request body into a local directory.
    fn fetch_zip(&self, body: &[u8]) -> Result<Utf8PathBuf>;
}

/// Production fetcher: blocking HTTP download plus zip extraction into
/// temporary directories.
///
/// The returned directories are *not* removed by the fetcher; the pipeline
/// and the push action own their removal so the files outlive the fetch call
/// for exactly one deploy.
pub struct ArtifactFetcher;

impl ArtifactFetcher {
    fn scratch_dir(&self) -> Result<Utf8PathBuf> {
        let dir = tempfile::Builder::new()
            .prefix("cutover-artifact-")
            .tempdir()
            .context("failed to create artifact scratch directory")?;
        Utf8PathBuf::from_path_buf(dir.keep())
            .map_err(|p| anyhow!("artifact scratch path is not UTF-8: {}", p.display()))
    }

    fn extract(&self, bytes: &[u8], target: &Utf8Path) -> Result<()> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
            .context("artifact is not a readable zip archive")?;
        archive
            .extract(target.as_std_path())
            .with_context(|| format!("failed to extract archive into {}", target))?;
        debug!("extracted {} archive entries into {}", archive.len(), target);
        Ok(())
    }
}

impl Fetcher for ArtifactFetcher {
    fn fetch(&self, url: &str, manifest: &str) -> Result<Utf8PathBuf> {
        info!("fetching artifact from {}", url);

        let response = ureq::get(url)
            .call()
            .with_context(|| format!("artifact request failed: {}", url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .with_context(|| format!("failed to read artifact body: {}", url))?;

        let target = self.scratch_dir()?;
        self.extract(&bytes, &target)?;

        if !manifest.is_empty() {
            fs::write(target.join("manifest.yml"), manifest)
                .with_context(|| format!("failed to write manifest into {}", target))?;
        }

        info!("fetched artifact into {}", target);
        Ok(target)
    }

    fn fetch_zip(&self, body: &[u8]) -> Result<Utf8PathBuf> {
        let target = self.scratch_dir()?;
        self.extract(body, &target)?;
        info!("extracted uploaded archive into {}", target);
        Ok(target)
    }
}

/// Reads `manifest.yml` from an artifact directory, if one is packaged.
pub fn read_packaged_manifest(path: &Utf8Path) -> Result<Option<String>> {
    let manifest_path = path.join("manifest.yml");
    match fs::read_to_string(&manifest_path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read manifest: {}", manifest_path))
        }
    }
}
