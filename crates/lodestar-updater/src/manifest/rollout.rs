//! Per-install rollout bucket, sampled once and persisted.

use crate::errors::Result;
use crate::types::RolloutBucket;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Share of installs placed in the canary bucket.
pub const CANARY_SHARE: f64 = 0.3;

#[derive(Debug, Serialize, Deserialize)]
struct RolloutFile {
    bucket: RolloutBucket,
}

pub fn sample_bucket<R: Rng + ?Sized>(rng: &mut R) -> RolloutBucket {
    if rng.gen_bool(CANARY_SHARE) {
        RolloutBucket::Canary
    } else {
        RolloutBucket::Control
    }
}

pub fn load_bucket(path: &Path) -> Option<RolloutBucket> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice::<RolloutFile>(&bytes).ok().map(|f| f.bucket)
}

pub fn save_bucket(path: &Path, bucket: RolloutBucket) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec_pretty(&RolloutFile { bucket })?)?;
    Ok(())
}

/// Override wins; otherwise the persisted bucket, otherwise a fresh sample
/// that is saved for next time.
pub fn effective_bucket(override_bucket: Option<RolloutBucket>, path: &Path) -> RolloutBucket {
    if let Some(b) = override_bucket {
        return b;
    }
    if let Some(b) = load_bucket(path) {
        return b;
    }
    let b = sample_bucket(&mut rand::thread_rng());
    if let Err(e) = save_bucket(path, b) {
        tracing::warn!("could not persist rollout bucket: {e}");
    }
    b
}
