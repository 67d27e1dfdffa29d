//! Updater configuration.
//!
//! Defaults are usable as-is; a JSON file can override any field and a few
//! `LODESTAR_*` environment variables override the file.

use crate::errors::Result;
use crate::paths::lodestar_home;
use crate::types::{ProxyRewrite, RolloutBucket, RuntimePackage};
use anyhow::Context;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Version-info endpoint. The track name (and bucket) is appended verbatim.
pub static DEFAULT_VERSION_INFO_URL: Lazy<String> = Lazy::new(|| {
    "https://releases.lodestar.dev/Hooks/Release/VersionInfo?track=".to_string()
});

/// Flat-container package index the runtime components come from.
pub static DEFAULT_PACKAGE_INDEX_URL: Lazy<String> =
    Lazy::new(|| "https://api.nuget.org/v3-flatcontainer".to_string());

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    pub install_root: PathBuf,
    pub version_info_url: String,
    pub package_index_url: String,

    /// Staged track to ask for when a beta key is set.
    pub beta_track: Option<String>,
    pub beta_key: Option<String>,
    /// Forces a bucket instead of the persisted/sampled one.
    pub rollout_bucket: Option<RolloutBucket>,

    /// Runner used instead of the managed payload (skips game version checks).
    pub runner_override: Option<PathBuf>,
    /// Copy each verified payload into hooks/dev.
    pub mirror_dev: bool,

    pub proxy_rewrites: Vec<ProxyRewrite>,

    pub payload_timeout_secs: u64,
    pub runtime_timeout_secs: u64,
    pub runtime_settle_ms: u64,

    /// Files that must be readable for a payload directory to count as installed.
    pub payload_files: Vec<String>,
    pub runner_file: String,

    pub runtime_platform: String,
    pub runtime_packages: Vec<RuntimePackage>,
    /// Engine-resolution library moved to host/fxr/<version>.
    pub engine_resolver_file: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let platform = "win-x64";
        Self {
            install_root: lodestar_home(),
            version_info_url: DEFAULT_VERSION_INFO_URL.clone(),
            package_index_url: DEFAULT_PACKAGE_INDEX_URL.clone(),
            beta_track: None,
            beta_key: None,
            rollout_bucket: None,
            runner_override: None,
            mirror_dev: true,
            proxy_rewrites: vec![ProxyRewrite {
                direct: "/File/Get/".into(),
                proxy: "/File/GetProxy/".into(),
            }],
            payload_timeout_secs: 600,
            runtime_timeout_secs: 600,
            runtime_settle_ms: 1000,
            payload_files: vec![
                "Lodestar.dll".into(),
                "Lodestar.Injector.exe".into(),
                "Lodestar.Interop.dll".into(),
            ],
            runner_file: "Lodestar.Injector.exe".into(),
            runtime_platform: platform.into(),
            runtime_packages: vec![
                RuntimePackage {
                    package_id: format!("microsoft.netcore.app.runtime.{platform}"),
                    component: "Microsoft.NETCore.App".into(),
                },
                RuntimePackage {
                    package_id: format!("microsoft.windowsdesktop.app.runtime.{platform}"),
                    component: "Microsoft.WindowsDesktop.App".into(),
                },
            ],
            engine_resolver_file: "hostfxr.dll".into(),
        }
    }
}

impl UpdaterConfig {
    /// Read a JSON config; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: UpdaterConfig = serde_json::from_str(&txt)
            .with_context(|| format!("invalid config JSON in {}", path.display()))?;
        Ok(cfg)
    }

    /// Apply `LODESTAR_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|k| std::env::var(k).ok());
    }

    fn apply_vars(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("LODESTAR_HOME") {
            self.install_root = PathBuf::from(v);
        }
        if let Some(v) = get("LODESTAR_VERSION_INFO_URL") {
            self.version_info_url = v;
        }
        if let Some(v) = get("LODESTAR_BETA_TRACK") {
            self.beta_track = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = get("LODESTAR_BETA_KEY") {
            self.beta_key = Some(v).filter(|s| !s.is_empty());
        }
        if let Some(v) = get("LODESTAR_RUNNER") {
            self.runner_override = Some(PathBuf::from(v));
        }
        if let Some(v) = get("LODESTAR_BUCKET") {
            match v.parse() {
                Ok(b) => self.rollout_bucket = Some(b),
                Err(e) => tracing::warn!("ignoring LODESTAR_BUCKET: {e}"),
            }
        }
    }

    pub fn payload_timeout(&self) -> Duration {
        Duration::from_secs(self.payload_timeout_secs)
    }

    pub fn runtime_timeout(&self) -> Duration {
        Duration::from_secs(self.runtime_timeout_secs)
    }

    pub fn runtime_settle(&self) -> Duration {
        Duration::from_millis(self.runtime_settle_ms)
    }
}
