use crate::errors::{Result, UpdateError};
use dirs::data_dir;
use std::path::{Path, PathBuf};

/// Name of the version directory that is never pruned.
pub const DEV_ALIAS_DIR: &str = "dev";

/// ~/.local/share/Lodestar   (or platform-equivalent)
pub fn lodestar_home() -> PathBuf {
    data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("Lodestar")
}

/// Remote-supplied names become directory names; reject anything that is not
/// a single plain path segment.
pub fn check_dir_segment(field: &str, value: &str) -> Result<()> {
    let bad = value.trim().is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', ':'])
        || value.contains('\0');
    if bad {
        return Err(UpdateError::Msg(format!("invalid {field} '{value}'")));
    }
    Ok(())
}

/// On-disk layout of one install root.
#[derive(Debug, Clone)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// <root>/hooks
    pub fn hooks_dir(&self) -> PathBuf {
        self.root.join("hooks")
    }

    /// <root>/hooks/<assembly_version>
    pub fn version_dir(&self, assembly_version: &str) -> PathBuf {
        self.hooks_dir().join(assembly_version)
    }

    /// <root>/hooks/dev
    pub fn dev_dir(&self) -> PathBuf {
        self.hooks_dir().join(DEV_ALIAS_DIR)
    }

    /// <root>/runtime
    pub fn runtime_dir(&self) -> PathBuf {
        self.root.join("runtime")
    }

    /// <root>/assets
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("assets")
    }

    /// <root>/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// <root>/rollout.json
    pub fn rollout_path(&self) -> PathBuf {
        self.root.join("rollout.json")
    }
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self::new(lodestar_home())
    }
}
