use crate::config::UpdaterConfig;
use crate::errors::{Result, UpdateError};
use crate::net::Downloader;
use crate::paths::check_dir_segment;
use crate::types::{DownloadProgress, RuntimePackage};
use crate::verify::{compute_manifest, write_manifest, HashVerifier};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::unzip::extract_package_subtree;

/// Runtime assumed present when no marker was ever written.
pub const LEGACY_RUNTIME_VERSION: &str = "5.0.6";

/// Plain-text file holding the provisioned runtime version.
pub const MARKER_FILE: &str = "version";

const PACKAGE_EXT: &str = "nupkg";

/// Why (or whether) the runtime has to be re-provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeCheck {
    Intact,
    VersionMismatch { local: String },
    PathsIncomplete,
    HashMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeAction {
    UpToDate,
    Provisioned,
}

/// Keeps `<root>/runtime` at exactly the version the payload needs.
pub struct RuntimeProvisioner {
    root: PathBuf,
    cache: PathBuf,
    index_url: String,
    platform: String,
    packages: Vec<RuntimePackage>,
    resolver_file: String,
    timeout: Duration,
    settle: Duration,
}

impl RuntimeProvisioner {
    pub fn new(config: &UpdaterConfig, root: PathBuf, cache: PathBuf) -> Self {
        Self {
            root,
            cache,
            index_url: config.package_index_url.trim_end_matches('/').to_string(),
            platform: config.runtime_platform.clone(),
            packages: config.runtime_packages.clone(),
            resolver_file: config.engine_resolver_file.clone(),
            timeout: config.runtime_timeout(),
            settle: config.runtime_settle(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn marker_path(&self) -> PathBuf {
        self.root.join(MARKER_FILE)
    }

    pub fn local_version(&self) -> String {
        fs::read_to_string(self.marker_path())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| LEGACY_RUNTIME_VERSION.to_string())
    }

    /// Directories the loader expects for `version`.
    pub fn required_paths(&self, version: &str) -> Vec<PathBuf> {
        let mut paths = vec![self.root.join("host").join("fxr").join(version)];
        for p in &self.packages {
            paths.push(self.root.join("shared").join(&p.component).join(version));
        }
        paths
    }

    /// Hashes are only looked at when the version already matches.
    pub fn check(&self, required: &str) -> RuntimeCheck {
        let local = self.local_version();
        if local != required {
            return RuntimeCheck::VersionMismatch { local };
        }
        if self.required_paths(required).iter().any(|p| !p.exists()) {
            return RuntimeCheck::PathsIncomplete;
        }
        if !HashVerifier::default().verify(&self.root) {
            return RuntimeCheck::HashMismatch;
        }
        RuntimeCheck::Intact
    }

    pub fn ensure(
        &self,
        downloader: &Downloader,
        required: &str,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<RuntimeAction> {
        check_dir_segment("runtimeVersion", required)?;
        match self.check(required) {
            RuntimeCheck::Intact => {
                tracing::debug!("runtime {required} intact");
                Ok(RuntimeAction::UpToDate)
            }
            reason => {
                tracing::info!("provisioning runtime {required} ({reason:?})");
                self.provision(downloader, required, progress)?;
                Ok(RuntimeAction::Provisioned)
            }
        }
    }

    pub fn package_url(&self, package_id: &str, version: &str) -> String {
        let id = package_id.to_lowercase();
        format!(
            "{}/{id}/{version}/{id}.{version}.{PACKAGE_EXT}",
            self.index_url
        )
    }

    fn provision(
        &self,
        downloader: &Downloader,
        version: &str,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(&self.root)?;
        // handles from the wipe can linger on some filesystems
        std::thread::sleep(self.settle);

        let framework = framework_major_minor(version);
        fs::create_dir_all(&self.cache)?;

        for pkg in &self.packages {
            let url = self.package_url(&pkg.package_id, version);
            let file = self
                .cache
                .join(format!("{}.{version}.{PACKAGE_EXT}", pkg.package_id.to_lowercase()));

            downloader.download(&url, &file, self.timeout, progress)?;
            let placed = extract_package_subtree(
                &file,
                &self.root,
                version,
                &framework,
                &pkg.component,
                &self.platform,
            )?;
            let _ = fs::remove_file(&file);

            if placed == 0 {
                return Err(UpdateError::Msg(format!(
                    "{} {version} has no files for {}",
                    pkg.package_id, self.platform
                )));
            }
        }

        self.relocate_resolver(version)?;

        let hashes = compute_manifest(&self.root, &[MARKER_FILE])?;
        write_manifest(&self.root, &hashes)?;

        // last: a marker means the tree above is complete
        fs::write(self.marker_path(), version)?;
        Ok(())
    }

    /// Move the engine-resolution library into host/fxr/<version>/.
    fn relocate_resolver(&self, version: &str) -> Result<()> {
        let core = self
            .packages
            .first()
            .ok_or_else(|| UpdateError::Msg("no runtime packages configured".into()))?;
        let src = self
            .root
            .join("shared")
            .join(&core.component)
            .join(version)
            .join(&self.resolver_file);
        if !src.is_file() {
            return Err(UpdateError::Msg(format!(
                "{} missing from {}",
                self.resolver_file, core.package_id
            )));
        }

        let dst_dir = self.root.join("host").join("fxr").join(version);
        fs::create_dir_all(&dst_dir)?;
        let dst = dst_dir.join(&self.resolver_file);
        if dst.exists() {
            fs::remove_file(&dst)?;
        }
        fs::rename(&src, &dst)?;
        Ok(())
    }
}

/// "8.0.1" -> "8.0"
pub fn framework_major_minor(version: &str) -> String {
    version.split('.').take(2).collect::<Vec<_>>().join(".")
}
