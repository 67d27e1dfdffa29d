//! lodestar-updater
//!
//! Blocking I/O updater for Lodestar's hook payload.
//! - Resolves the release (or keyed staged) manifest for this install's rollout bucket.
//! - Verifies installed versions against `hashes.json`, redownloading when stale or corrupt.
//! - Assembles the managed runtime from component packages.
//! - Retries the whole cycle, falling back to the proxy transport after a failure.
//!
//! Run it through `UpdateOrchestrator::spawn` to keep the UI responsive.

pub mod config;
pub mod errors;
pub mod install;
pub mod manifest;
pub mod net;
pub mod orchestrator;
pub mod paths;
pub mod state;
pub mod traits;
pub mod types;
pub mod verify;

pub use config::UpdaterConfig;
pub use errors::{EnsureTarget, ErrorKind, UpdateError};
pub use install::{RuntimeAction, RuntimeProvisioner};
pub use manifest::{Resolution, VersionResolver};
pub use net::{Downloader, ReqwestTransport, Transport};
pub use orchestrator::{Collaborators, UpdateOrchestrator, MAX_ATTEMPTS};
pub use paths::InstallLayout;
pub use state::UpdaterState;
pub use traits::*;
pub use types::*;
pub use verify::HashVerifier;
