#![allow(dead_code)]

use lodestar_updater::errors::{Result, UpdateError};
use lodestar_updater::verify::{compute_manifest, write_manifest};
use lodestar_updater::{DownloadProgress, ReleaseManifest, RolloutBucket, Transport, UpdaterConfig};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use zip::write::FileOptions;
use zip::ZipWriter;

pub const VERSION_INFO: &str = "https://releases.test/VersionInfo?track=";
pub const RELEASE_URL: &str = "https://releases.test/VersionInfo?track=release&bucket=Control";
pub const PACKAGE_INDEX: &str = "https://pkgs.test/v3";
pub const PAYLOAD_URL: &str = "https://releases.test/File/Get/lodestar-9.1.0.0.zip";
pub const PAYLOAD_PROXY_URL: &str = "https://releases.test/File/GetProxy/lodestar-9.1.0.0.zip";
pub const PAYLOAD_FILES: [&str; 3] = ["Lodestar.dll", "Lodestar.Injector.exe", "Lodestar.Interop.dll"];

/// In-memory HTTP endpoint that counts what it serves.
#[derive(Default)]
pub struct MockServer {
    texts: Mutex<HashMap<String, std::result::Result<String, u16>>>,
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub text_hits: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl MockServer {
    pub fn serve_text(&self, url: &str, body: impl Into<String>) {
        self.texts.lock().unwrap().insert(url.to_string(), Ok(body.into()));
    }

    pub fn serve_status(&self, url: &str, status: u16) {
        self.texts.lock().unwrap().insert(url.to_string(), Err(status));
    }

    pub fn serve_manifest(&self, url: &str, m: &ReleaseManifest) {
        self.serve_text(url, serde_json::to_string(m).unwrap());
    }

    pub fn serve_file(&self, url: &str, bytes: Vec<u8>) {
        self.files.lock().unwrap().insert(url.to_string(), bytes);
    }

    pub fn remove_file(&self, url: &str) {
        self.files.lock().unwrap().remove(url);
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn text_hits(&self) -> usize {
        self.text_hits.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.text_hits.store(0, Ordering::SeqCst);
        self.downloads.lock().unwrap().clear();
    }
}

impl Transport for MockServer {
    fn get_text(&self, url: &str) -> Result<String> {
        self.text_hits.fetch_add(1, Ordering::SeqCst);
        match self.texts.lock().unwrap().get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(UpdateError::Status {
                url: url.to_string(),
                status: *status,
            }),
            None => Err(UpdateError::Msg(format!("connection refused: {url}"))),
        }
    }

    fn download_to(
        &self,
        url: &str,
        dest: &Path,
        _timeout: Duration,
        progress: &mut dyn FnMut(DownloadProgress),
    ) -> Result<u64> {
        self.downloads.lock().unwrap().push(url.to_string());
        let bytes = self
            .files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| UpdateError::Status {
                url: url.to_string(),
                status: 404,
            })?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(dest, &bytes)?;
        let total = bytes.len() as u64;
        progress(DownloadProgress::new(Some(total), total / 2));
        progress(DownloadProgress::new(Some(total), total));
        Ok(total)
    }
}

pub fn release_manifest() -> ReleaseManifest {
    ReleaseManifest {
        assembly_version: "9.1.0.0".into(),
        runtime_version: "8.0.1".into(),
        runtime_required: true,
        supported_game_version: "2024.06.18.0000.0000".into(),
        download_url: PAYLOAD_URL.into(),
        rollout_key: None,
    }
}

pub fn config(root: &Path) -> UpdaterConfig {
    UpdaterConfig {
        install_root: root.to_path_buf(),
        version_info_url: VERSION_INFO.into(),
        package_index_url: PACKAGE_INDEX.into(),
        rollout_bucket: Some(RolloutBucket::Control),
        runtime_settle_ms: 0,
        ..Default::default()
    }
}

pub fn zip_entries(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn zip_tree(dir: &Path, prefix: &str, zip: &mut ZipWriter<Cursor<Vec<u8>>>) {
    let mut entries: Vec<_> = fs::read_dir(dir).unwrap().map(|e| e.unwrap()).collect();
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let name = format!("{prefix}{}", entry.file_name().to_string_lossy());
        if entry.file_type().unwrap().is_dir() {
            zip_tree(&entry.path(), &format!("{name}/"), zip);
        } else {
            zip.start_file(name, FileOptions::default()).unwrap();
            zip.write_all(&fs::read(entry.path()).unwrap()).unwrap();
        }
    }
}

/// A payload archive whose `hashes.json` matches its contents.
pub fn payload_zip(tag: &str) -> Vec<u8> {
    let staging = tempfile::tempdir().unwrap();
    for name in PAYLOAD_FILES {
        fs::write(staging.path().join(name), format!("{name} build {tag}")).unwrap();
    }
    fs::create_dir_all(staging.path().join("plugins")).unwrap();
    fs::write(staging.path().join("plugins/Bundled.dll"), b"bundled").unwrap();
    write_manifest(staging.path(), &compute_manifest(staging.path(), &[]).unwrap()).unwrap();

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip_tree(staging.path(), "", &mut zip);
    zip.finish().unwrap().into_inner()
}

pub fn core_package_url() -> String {
    format!(
        "{PACKAGE_INDEX}/microsoft.netcore.app.runtime.win-x64/8.0.1/microsoft.netcore.app.runtime.win-x64.8.0.1.nupkg"
    )
}

pub fn desktop_package_url() -> String {
    format!(
        "{PACKAGE_INDEX}/microsoft.windowsdesktop.app.runtime.win-x64/8.0.1/microsoft.windowsdesktop.app.runtime.win-x64.8.0.1.nupkg"
    )
}

pub fn serve_runtime(server: &MockServer) {
    server.serve_file(
        &core_package_url(),
        zip_entries(&[
            ("runtimes/win-x64/native/hostfxr.dll", b"fxr"),
            ("runtimes/win-x64/native/coreclr.dll", b"clr"),
            ("runtimes/win-x64/lib/net8.0/System.Private.CoreLib.dll", b"corelib"),
            ("ref/net8.0/System.Runtime.dll", b"ref"),
        ]),
    );
    server.serve_file(
        &desktop_package_url(),
        zip_entries(&[
            ("runtimes/win-x64/native/wpfgfx_cor3.dll", b"wpf"),
            ("runtimes/win-x64/lib/net8.0/PresentationCore.dll", b"pc"),
        ]),
    );
}

/// Server with a release manifest, payload and both runtime packages.
pub fn full_server() -> MockServer {
    let server = MockServer::default();
    server.serve_manifest(RELEASE_URL, &release_manifest());
    server.serve_file(PAYLOAD_URL, payload_zip("release"));
    serve_runtime(&server);
    server
}
