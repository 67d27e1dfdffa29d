use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Remote release descriptor. One manifest names exactly one payload version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseManifest {
    pub assembly_version: String,     // e.g. "9.1.0.0"
    pub runtime_version: String,      // e.g. "8.0.1"
    pub runtime_required: bool,
    pub supported_game_version: String,
    pub download_url: String,         // payload zip
    #[serde(default, alias = "key", skip_serializing_if = "Option::is_none")]
    pub rollout_key: Option<String>, // only set on staged tracks
}

/// Staged-rollout grouping forwarded to the version endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RolloutBucket {
    Canary,
    Control,
}

impl fmt::Display for RolloutBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutBucket::Canary => write!(f, "Canary"),
            RolloutBucket::Control => write!(f, "Control"),
        }
    }
}

impl FromStr for RolloutBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "canary" => Ok(RolloutBucket::Canary),
            "control" => Ok(RolloutBucket::Control),
            other => Err(format!("unknown rollout bucket '{other}'")),
        }
    }
}

/// Lifecycle of one orchestrator run. Only moves forward within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Unknown,
    Running,
    Done,
    NoIntegrity,
}

impl UpdateState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UpdateState::Done | UpdateState::NoIntegrity)
    }
}

/// Which part of the install the progress sink is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    Payload,
    Runtime,
    Assets,
}

/// Progress of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub total: Option<u64>,
    pub downloaded: u64,
    pub fraction: Option<f64>,
}

impl DownloadProgress {
    pub fn new(total: Option<u64>, downloaded: u64) -> Self {
        let fraction = match total {
            Some(t) if t > 0 => Some(downloaded as f64 / t as f64),
            _ => None,
        };
        Self {
            total,
            downloaded,
            fraction,
        }
    }
}

/// Result of the external asset manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
    pub directory: PathBuf,
    pub version: u32,
}

/// What a successful run publishes to the launcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPaths {
    pub runner: PathBuf,
    pub version_directory: PathBuf,
    pub runtime_directory: PathBuf,
    pub asset_directory: PathBuf,
    pub asset_version: u32,
}

/// One redistributable component package assembled into the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimePackage {
    pub package_id: String, // e.g. "microsoft.netcore.app.runtime.win-x64"
    pub component: String,  // e.g. "Microsoft.NETCore.App"
}

/// Direct -> proxy URL segment rewrite applied when the proxy is forced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyRewrite {
    pub direct: String,
    pub proxy: String,
}
