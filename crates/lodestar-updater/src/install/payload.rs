//! Payload version directories: fetch, prune, mirror.

use crate::errors::Result;
use crate::net::Downloader;
use crate::paths::DEV_ALIAS_DIR;
use crate::types::{DownloadProgress, ReleaseManifest};
use anyhow::Context;
use std::fs;
use std::path::Path;
use std::time::Duration;
use walkdir::WalkDir;

use super::unzip::extract_fresh;

/// Persisted copy of the manifest a version directory was verified against.
pub const VERSION_FILE: &str = "version.json";

/// Download the payload zip into `cache` and unpack it fresh into `version_dir`.
pub fn install_payload(
    downloader: &Downloader,
    manifest: &ReleaseManifest,
    version_dir: &Path,
    cache: &Path,
    timeout: Duration,
    progress: &mut dyn FnMut(DownloadProgress),
) -> Result<()> {
    fs::create_dir_all(cache)?;
    let zip_path = cache.join(format!("payload-{}.zip", manifest.assembly_version));

    downloader.download(&manifest.download_url, &zip_path, timeout, progress)?;
    extract_fresh(&zip_path, version_dir)?;
    let _ = fs::remove_file(&zip_path);
    Ok(())
}

/// Delete every version directory except `current` and the dev alias.
/// Failures are logged and skipped. Returns how many were removed.
pub fn prune_versions(hooks_dir: &Path, current: &str) -> usize {
    let entries = match fs::read_dir(hooks_dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("cannot list {}: {e}", hooks_dir.display());
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == DEV_ALIAS_DIR || name == current {
            continue;
        }
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                tracing::info!("pruned old payload {name}");
                removed += 1;
            }
            Err(e) => tracing::warn!("could not prune {}: {e}", entry.path().display()),
        }
    }
    removed
}

/// Replace `dev` with a copy of `src`.
pub fn mirror_dir(src: &Path, dev: &Path) -> Result<()> {
    if dev.exists() {
        fs::remove_dir_all(dev)?;
    }
    copy_tree(src, dev)
}

fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("creating {}", dst.display()))?;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.with_context(|| format!("walking {}", src.display()))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).with_context(|| format!("creating {}", target.display()))?;
            continue;
        }
        fs::copy(entry.path(), &target).with_context(|| {
            format!("copying {} -> {}", entry.path().display(), target.display())
        })?;
    }
    Ok(())
}

pub fn write_version_file(version_dir: &Path, manifest: &ReleaseManifest) -> Result<()> {
    fs::write(
        version_dir.join(VERSION_FILE),
        serde_json::to_vec_pretty(manifest)?,
    )?;
    Ok(())
}

pub fn read_version_file(version_dir: &Path) -> Option<ReleaseManifest> {
    let bytes = fs::read(version_dir.join(VERSION_FILE)).ok()?;
    serde_json::from_slice(&bytes).ok()
}
