//! Model-parameter bundle provisioning.
//!
//! The trained-parameter archive is multi-gigabyte and immutable, so the
//! whole stage is built around doing the download exactly once: the
//! sentinel file in the publish directory is the sole proof of completion,
//! and a rerun that finds it returns before any network or staging work.
//!
//! Download, integrity and publish failures are deliberately distinct
//! errors. A truncated transfer, a zero-byte archive and a botched
//! symlink step need different remediation, and the one-line failure
//! summary must say which one happened.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{CraftenvError, Result};
use crate::profile::{ExecutionContext, InstallationProfile, LinkMode, WEIGHTS_SENTINEL};
use crate::ui;

/// One external binary bundle to fetch, verify, extract and publish.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    /// Archive source.
    pub url: String,
    /// Where the archive is downloaded before verification.
    pub staging_path: PathBuf,
    /// Where extracted entries live permanently.
    pub storage_dir: PathBuf,
    /// Where entries are published for the toolchain to find.
    pub publish_dir: PathBuf,
    /// File whose presence in `publish_dir` proves completion.
    pub sentinel: String,
    /// Publish by symlink or physical copy.
    pub link_mode: LinkMode,
}

impl AssetBundle {
    /// Parameter bundle for a profile, staged in the run's scratch dir.
    pub fn weights(profile: &InstallationProfile, ctx: &ExecutionContext) -> Self {
        let filename = profile
            .weights_url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("params.tar");
        Self {
            url: profile.weights_url.clone(),
            staging_path: ctx.scratch_dir().join(filename),
            storage_dir: profile.weights_dir.clone(),
            publish_dir: profile.params_dir(),
            sentinel: WEIGHTS_SENTINEL.to_string(),
            link_mode: profile.link_mode,
        }
    }

    /// Sentinel location in the publish directory.
    pub fn sentinel_path(&self) -> PathBuf {
        self.publish_dir.join(&self.sentinel)
    }
}

fn download(url: &str, dest: &Path) -> Result<()> {
    let failed = |message: String| CraftenvError::AssetDownloadFailed {
        url: url.to_string(),
        message,
    };

    let response = reqwest::blocking::get(url).map_err(|e| failed(e.to_string()))?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bar = ui::download_bar(response.content_length());
    let mut reader = bar.wrap_read(response);
    let mut file = fs::File::create(dest)?;
    io::copy(&mut reader, &mut file).map_err(|e| failed(e.to_string()))?;
    bar.finish_and_clear();
    Ok(())
}

/// Check the staged archive before extraction: non-empty, and every entry
/// header in the table of contents readable.
fn verify_archive(path: &Path) -> Result<()> {
    let corrupt = |message: String| CraftenvError::AssetCorrupt { message };

    let size = fs::metadata(path)?.len();
    if size == 0 {
        return Err(corrupt(format!(
            "downloaded archive {} is empty",
            path.display()
        )));
    }

    let file = fs::File::open(path)?;
    let mut archive = tar::Archive::new(file);
    let mut entry_count = 0usize;
    for entry in archive
        .entries()
        .map_err(|e| corrupt(format!("unreadable archive: {e}")))?
    {
        entry.map_err(|e| corrupt(format!("unreadable archive entry: {e}")))?;
        entry_count += 1;
    }
    if entry_count == 0 {
        return Err(corrupt(format!(
            "archive {} contains no entries",
            path.display()
        )));
    }
    Ok(())
}

fn extract(archive_path: &Path, storage_dir: &Path) -> Result<()> {
    fs::create_dir_all(storage_dir)?;
    let file = fs::File::open(archive_path)?;
    let mut archive = tar::Archive::new(file);
    archive
        .unpack(storage_dir)
        .map_err(|e| CraftenvError::AssetCorrupt {
            message: format!("extraction failed: {e}"),
        })?;
    Ok(())
}

#[cfg(unix)]
fn link_entry(source: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(not(unix))]
fn link_entry(source: &Path, dest: &Path) -> io::Result<()> {
    // Windows symlinks need elevated privileges; fall back to copying.
    copy_entry(source, dest)
}

fn copy_entry(source: &Path, dest: &Path) -> io::Result<()> {
    if source.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, dest)?;
    }
    Ok(())
}

/// Publish every top-level storage entry into the publish directory.
fn publish(storage_dir: &Path, publish_dir: &Path, mode: LinkMode) -> Result<()> {
    fs::create_dir_all(publish_dir)?;
    for entry in fs::read_dir(storage_dir)? {
        let entry = entry?;
        let dest = publish_dir.join(entry.file_name());
        if dest.exists() || dest.is_symlink() {
            if dest.is_dir() && !dest.is_symlink() {
                fs::remove_dir_all(&dest)?;
            } else {
                fs::remove_file(&dest)?;
            }
        }
        match mode {
            LinkMode::Symlink => link_entry(&entry.path(), &dest)?,
            LinkMode::Copy => copy_entry(&entry.path(), &dest)?,
        }
    }
    Ok(())
}

/// Fetch, verify, extract and publish a bundle. Idempotent: a present
/// sentinel short-circuits with zero network access.
pub fn provision(bundle: &AssetBundle) -> Result<()> {
    if bundle.sentinel_path().exists() {
        info!(
            sentinel = %bundle.sentinel_path().display(),
            "parameter bundle already provisioned, skipping"
        );
        return Ok(());
    }

    info!(url = %bundle.url, "downloading parameter archive");
    download(&bundle.url, &bundle.staging_path)?;

    verify_archive(&bundle.staging_path)?;

    info!(storage = %bundle.storage_dir.display(), "extracting parameter archive");
    extract(&bundle.staging_path, &bundle.storage_dir)?;

    publish(&bundle.storage_dir, &bundle.publish_dir, bundle.link_mode)?;

    // A claimed-successful extraction without the sentinel means the
    // bundle contents were not what this toolchain needs.
    if !bundle.sentinel_path().exists() {
        return Err(CraftenvError::AssetVerificationFailed {
            publish_dir: bundle.publish_dir.clone(),
            sentinel: bundle.sentinel.clone(),
        });
    }

    if let Err(e) = fs::remove_file(&bundle.staging_path) {
        warn!(
            staging = %bundle.staging_path.display(),
            "could not remove staged archive: {e}"
        );
    }

    Ok(())
}
