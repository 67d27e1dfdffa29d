//! Top-level update cycle: resolve, verify, fetch, provision, assets, re-verify.
//!
//! One run makes up to [`MAX_ATTEMPTS`] sequential attempts. Any failure
//! forces the proxy transport for the rest of that run.

use crate::config::UpdaterConfig;
use crate::errors::{EnsureTarget, Result, UpdateError};
use crate::install::{install_payload, mirror_dir, prune_versions, write_version_file, RuntimeProvisioner};
use crate::manifest::rollout::effective_bucket;
use crate::manifest::VersionResolver;
use crate::net::{Downloader, Transport};
use crate::paths::InstallLayout;
use crate::state::UpdaterState;
use crate::traits::{
    AssetManager, GameProbe, GameVersionFile, GameVersionReader, LocalAssetDir, NeverRunning,
    NoopUidCache, NullProgress, ProgressSink, UidCache,
};
use crate::types::{
    DownloadProgress, InstalledPaths, ReleaseManifest, RolloutBucket, UpdateState, UpdateStep,
};
use crate::verify::HashVerifier;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;

pub const MAX_ATTEMPTS: u32 = 10;

/// Launcher-side components the cycle calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub progress: Arc<dyn ProgressSink>,
    pub uid_cache: Arc<dyn UidCache>,
    pub assets: Arc<dyn AssetManager>,
    pub game: Arc<dyn GameProbe>,
    pub game_version: Arc<dyn GameVersionReader>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            progress: Arc::new(NullProgress),
            uid_cache: Arc::new(NoopUidCache),
            assets: Arc::new(LocalAssetDir),
            game: Arc::new(NeverRunning),
            game_version: Arc::new(GameVersionFile::new("game/game.ver")),
        }
    }
}

pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    layout: InstallLayout,
    transport: Arc<dyn Transport>,
    hooks: Collaborators,
    state: UpdaterState,
    bucket: RolloutBucket,
}

impl UpdateOrchestrator {
    pub fn new(config: UpdaterConfig, transport: Arc<dyn Transport>, hooks: Collaborators) -> Self {
        let layout = InstallLayout::new(config.install_root.clone());
        let bucket = effective_bucket(config.rollout_bucket, &layout.rollout_path());
        Self {
            config,
            layout,
            transport,
            hooks,
            state: UpdaterState::new(),
            bucket,
        }
    }

    pub fn state(&self) -> &UpdaterState {
        &self.state
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn bucket(&self) -> RolloutBucket {
        self.bucket
    }

    /// Run the cycle on a background thread.
    pub fn spawn(self: Arc<Self>) -> std::io::Result<JoinHandle<UpdateState>> {
        std::thread::Builder::new()
            .name("lodestar-update".into())
            .spawn(move || self.run())
    }

    /// Run the cycle on this thread and return the terminal state.
    pub fn run(&self) -> UpdateState {
        if !self.state.begin_run() {
            tracing::warn!("update already running");
            return self.state.state();
        }
        tracing::info!(bucket = %self.bucket, "update run started");

        let mut downloader = Downloader::new(self.transport.clone(), self.config.proxy_rewrites.clone());

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&downloader) {
                Ok(installed) => {
                    tracing::info!(attempt, "payload ready at {}", installed.runner.display());
                    self.hooks.progress.set_invisible();
                    self.state.finish_done(installed);
                    return UpdateState::Done;
                }
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        kind = ?e.kind(),
                        proxy = downloader.force_proxy(),
                        "update attempt failed: {e}"
                    );
                    self.state.record_error(e);
                    downloader.set_force_proxy(true);
                }
            }
        }

        tracing::error!("giving up after {MAX_ATTEMPTS} attempts");
        self.hooks.progress.set_invisible();
        self.state.finish_failed();
        UpdateState::NoIntegrity
    }

    fn attempt(&self, downloader: &Downloader) -> Result<InstalledPaths> {
        let resolver = VersionResolver::new(
            self.transport.clone(),
            self.config.version_info_url.clone(),
            self.bucket,
        );
        let resolution = resolver.resolve(
            self.config.beta_track.as_deref(),
            self.config.beta_key.as_deref(),
        )?;
        let manifest = resolution.manifest;
        self.state.publish_manifest(Some(manifest.clone()));
        if resolution.staged {
            self.state.mark_staged();
        }

        let version_dir = self.layout.version_dir(&manifest.assembly_version);
        let verifier = HashVerifier::new(self.config.payload_files.clone());

        if !verifier.verify(&version_dir) {
            self.refresh_payload(downloader, &manifest, &version_dir)
                .map_err(|e| UpdateError::ensure(EnsureTarget::Payload, e))?;
        }

        let runtime_dir = self.layout.runtime_dir();
        if manifest.runtime_required {
            self.hooks.progress.set_step(UpdateStep::Runtime);
            self.hooks.progress.set_visible();
            let provisioner =
                RuntimeProvisioner::new(&self.config, runtime_dir.clone(), self.layout.cache_dir());
            provisioner
                .ensure(
                    downloader,
                    &manifest.runtime_version,
                    &mut report_to(self.hooks.progress.as_ref()),
                )
                .map_err(|e| UpdateError::ensure(EnsureTarget::Runtime, e))?;
        }

        self.hooks.progress.set_step(UpdateStep::Assets);
        let bundle = self
            .hooks
            .assets
            .ensure_assets(self.hooks.progress.as_ref(), &self.layout.assets_dir())
            .map_err(|e| UpdateError::ensure(EnsureTarget::Assets, e))?;

        if !verifier.verify(&version_dir) {
            return Err(UpdateError::ensure(
                EnsureTarget::Payload,
                UpdateError::Integrity(format!(
                    "{} failed verification after update",
                    version_dir.display()
                )),
            ));
        }

        write_version_file(&version_dir, &manifest)?;
        if self.config.mirror_dev {
            if let Err(e) = mirror_dir(&version_dir, &self.layout.dev_dir()) {
                tracing::warn!("could not mirror payload into dev: {e}");
            }
        }

        let runner = self
            .config
            .runner_override
            .clone()
            .unwrap_or_else(|| version_dir.join(&self.config.runner_file));

        Ok(InstalledPaths {
            runner,
            version_directory: version_dir,
            runtime_directory: runtime_dir,
            asset_directory: bundle.directory,
            asset_version: bundle.version,
        })
    }

    fn refresh_payload(
        &self,
        downloader: &Downloader,
        manifest: &ReleaseManifest,
        version_dir: &Path,
    ) -> Result<()> {
        tracing::info!("payload {} missing or corrupt", manifest.assembly_version);
        self.hooks.progress.set_step(UpdateStep::Payload);
        self.hooks.progress.set_visible();

        install_payload(
            downloader,
            manifest,
            version_dir,
            &self.layout.cache_dir(),
            self.config.payload_timeout(),
            &mut report_to(self.hooks.progress.as_ref()),
        )?;
        self.hooks.uid_cache.reset();

        if self.hooks.game.is_game_running() {
            tracing::info!("game is running, leaving old payloads in place");
        } else {
            prune_versions(&self.layout.hooks_dir(), &manifest.assembly_version);
        }
        Ok(())
    }

    /// `None` until a run is `Done`; then whether the payload supports the game.
    pub fn recheck_version(&self, game_path: &Path) -> Option<bool> {
        if self.state.state() != UpdateState::Done {
            return None;
        }
        if self.config.runner_override.is_some() {
            return Some(true);
        }
        let manifest = self.state.manifest()?;
        match self.hooks.game_version.game_version(game_path) {
            Ok(v) => Some(v == manifest.supported_game_version),
            Err(e) => {
                tracing::warn!("could not read game version: {e}");
                Some(false)
            }
        }
    }
}

fn report_to(sink: &dyn ProgressSink) -> impl FnMut(DownloadProgress) + '_ {
    move |p| sink.report_progress(p.total, p.downloaded, p.fraction)
}
