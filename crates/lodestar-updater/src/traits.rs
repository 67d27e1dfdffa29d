//! Seams to the launcher components the updater drives but does not own.

use crate::errors::Result;
use crate::types::{AssetBundle, UpdateStep};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// UI/overlay progress. Calls arrive from the updater's I/O thread.
pub trait ProgressSink: Send + Sync {
    fn set_step(&self, step: UpdateStep);
    fn set_visible(&self);
    fn set_invisible(&self);
    fn report_progress(&self, total: Option<u64>, downloaded: u64, fraction: Option<f64>);
}

/// Cache keyed by payload contents; must be dropped after a fresh download.
pub trait UidCache: Send + Sync {
    fn reset(&self);
}

/// Brings the supplemental asset bundle up to date.
pub trait AssetManager: Send + Sync {
    fn ensure_assets(&self, progress: &dyn ProgressSink, asset_root: &Path) -> Result<AssetBundle>;
}

/// Whether the game currently has payload files loaded.
pub trait GameProbe: Send + Sync {
    fn is_game_running(&self) -> bool;
}

/// Reports the installed game's version.
pub trait GameVersionReader: Send + Sync {
    fn game_version(&self, game_path: &Path) -> Result<String>;
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn set_step(&self, _step: UpdateStep) {}
    fn set_visible(&self) {}
    fn set_invisible(&self) {}
    fn report_progress(&self, _total: Option<u64>, _downloaded: u64, _fraction: Option<f64>) {}
}

pub struct NoopUidCache;

impl UidCache for NoopUidCache {
    fn reset(&self) {}
}

pub struct NeverRunning;

impl GameProbe for NeverRunning {
    fn is_game_running(&self) -> bool {
        false
    }
}

/// Asset manager for installs without a remote bundle: just makes the directory.
pub struct LocalAssetDir;

impl AssetManager for LocalAssetDir {
    fn ensure_assets(&self, _progress: &dyn ProgressSink, asset_root: &Path) -> Result<AssetBundle> {
        fs::create_dir_all(asset_root)?;
        Ok(AssetBundle {
            directory: asset_root.to_path_buf(),
            version: 0,
        })
    }
}

/// Reads a single-line version file relative to the game path.
pub struct GameVersionFile {
    relative: PathBuf,
}

impl GameVersionFile {
    pub fn new(relative: impl Into<PathBuf>) -> Self {
        Self {
            relative: relative.into(),
        }
    }
}

impl GameVersionReader for GameVersionFile {
    fn game_version(&self, game_path: &Path) -> Result<String> {
        let path = game_path.join(&self.relative);
        let txt =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(txt.trim().to_string())
    }
}
