pub mod rollout;

use crate::errors::Result;
use crate::net::Transport;
use crate::paths::check_dir_segment;
use crate::types::{ReleaseManifest, RolloutBucket};
use anyhow::Context;
use std::sync::Arc;

/// Track asked for when a beta key is given without a track name.
pub const DEFAULT_BETA_TRACK: &str = "beta";

/// The manifest chosen for this update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub manifest: ReleaseManifest,
    pub staged: bool,
}

pub struct VersionResolver {
    transport: Arc<dyn Transport>,
    base_url: String,
    bucket: RolloutBucket,
}

impl VersionResolver {
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>, bucket: RolloutBucket) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            bucket,
        }
    }

    pub fn bucket(&self) -> RolloutBucket {
        self.bucket
    }

    pub fn release_url(&self) -> String {
        format!("{}release&bucket={}", self.base_url, self.bucket)
    }

    pub fn track_url(&self, track: &str) -> String {
        format!("{}{}", self.base_url, track)
    }

    /// Fetch manifest JSON (blocking).
    pub fn fetch_manifest(&self, url: &str) -> Result<ReleaseManifest> {
        let txt = self.transport.get_text(url)?;
        let m: ReleaseManifest =
            serde_json::from_str(&txt).with_context(|| format!("invalid manifest JSON from {url}"))?;
        // both versions name directories under the install root
        check_dir_segment("assemblyVersion", &m.assembly_version)?;
        check_dir_segment("runtimeVersion", &m.runtime_version)?;
        Ok(m)
    }

    /// Fetch release (and staged, if keyed) manifests and pick one.
    /// Only a 400 on the staged track is tolerated; every other failure propagates.
    pub fn resolve(&self, beta_track: Option<&str>, beta_key: Option<&str>) -> Result<Resolution> {
        let release = self.fetch_manifest(&self.release_url())?;

        let key = beta_key.filter(|k| !k.is_empty());
        let staged = match key {
            None => None,
            Some(_) => {
                let track = beta_track
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_BETA_TRACK);
                match self.fetch_manifest(&self.track_url(track)) {
                    Ok(m) => Some(m),
                    Err(e) if e.is_bad_request() => {
                        tracing::info!("no staged track '{track}', using release");
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        Ok(select(release, staged, key))
    }
}

/// Staged wins iff it exists and its rollout key equals the non-empty caller key.
pub fn select(release: ReleaseManifest, staged: Option<ReleaseManifest>, key: Option<&str>) -> Resolution {
    match (staged, key.filter(|k| !k.is_empty())) {
        (Some(s), Some(k)) if s.rollout_key.as_deref() == Some(k) => Resolution {
            manifest: s,
            staged: true,
        },
        _ => Resolution {
            manifest: release,
            staged: false,
        },
    }
}
