use crate::errors::UpdateError;
use crate::types::{InstalledPaths, ReleaseManifest, UpdateState};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Called with the newly resolved manifest (`None` when a run resets it).
pub type ManifestObserver = Box<dyn Fn(Option<&ReleaseManifest>) + Send + Sync>;

/// Shared, observable state of one orchestrator.
///
/// Written only by the run thread; any thread may read it.
#[derive(Clone, Default)]
pub struct UpdaterState {
    inner: Arc<RwLock<Inner>>,
    observers: Arc<RwLock<Vec<ManifestObserver>>>,
}

#[derive(Default)]
struct Inner {
    state: UpdateState,
    manifest: Option<ReleaseManifest>,
    staged: bool,
    fatal_error: Option<Arc<UpdateError>>,
    installed: Option<InstalledPaths>,
}

impl UpdaterState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, observer: impl Fn(Option<&ReleaseManifest>) + Send + Sync + 'static) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    pub fn state(&self) -> UpdateState {
        self.read().state
    }

    pub fn manifest(&self) -> Option<ReleaseManifest> {
        self.read().manifest.clone()
    }

    pub fn is_staged(&self) -> bool {
        self.read().staged
    }

    pub fn fatal_error(&self) -> Option<Arc<UpdateError>> {
        self.read().fatal_error.clone()
    }

    pub fn installed(&self) -> Option<InstalledPaths> {
        self.read().installed.clone()
    }

    /// Enter `Running`. Refused while a run is already in flight.
    pub(crate) fn begin_run(&self) -> bool {
        {
            let mut g = self.write();
            if g.state == UpdateState::Running {
                return false;
            }
            g.state = UpdateState::Running;
            g.fatal_error = None;
            g.installed = None;
            g.staged = false;
        }
        self.publish_manifest(None);
        true
    }

    /// Store the resolved manifest; observers fire only if it changed.
    pub fn publish_manifest(&self, manifest: Option<ReleaseManifest>) -> bool {
        let changed = {
            let mut g = self.write();
            if g.manifest == manifest {
                false
            } else {
                g.manifest = manifest.clone();
                true
            }
        };

        if changed {
            let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
            for observer in observers.iter() {
                observer(manifest.as_ref());
            }
        }
        changed
    }

    pub(crate) fn mark_staged(&self) {
        self.write().staged = true;
    }

    pub(crate) fn record_error(&self, err: UpdateError) {
        self.write().fatal_error = Some(Arc::new(err));
    }

    pub(crate) fn finish_done(&self, installed: InstalledPaths) {
        let mut g = self.write();
        g.installed = Some(installed);
        g.state = UpdateState::Done;
    }

    pub(crate) fn finish_failed(&self) {
        self.write().state = UpdateState::NoIntegrity;
    }
}
