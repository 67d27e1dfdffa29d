//! Content-hash verification of installed directories.
//!
//! A directory carries `hashes.json`: relative forward-slash path -> hex
//! SHA-256. Digests are written uppercase and compared case-insensitively.

use crate::errors::{Result, UpdateError};
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

pub const INTEGRITY_FILE: &str = "hashes.json";

pub type IntegrityManifest = BTreeMap<String, String>;

#[derive(Debug, Clone, Default)]
pub struct HashVerifier {
    /// Files that must open and yield bytes before hashing even starts.
    required: Vec<String>,
}

impl HashVerifier {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }

    /// True only if every probe file reads and every manifest entry matches.
    pub fn verify(&self, dir: &Path) -> bool {
        match self.check(dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("{} failed verification: {e}", dir.display());
                false
            }
        }
    }

    fn check(&self, dir: &Path) -> Result<()> {
        for name in &self.required {
            probe_readable(&dir.join(name))?;
        }

        let manifest_path = dir.join(INTEGRITY_FILE);
        if !manifest_path.is_file() {
            return Err(UpdateError::Integrity(format!(
                "no {INTEGRITY_FILE} in {}",
                dir.display()
            )));
        }
        let manifest = load_manifest(&manifest_path)?;

        for (rel, want) in &manifest {
            let got = hash_file(&manifest_path_to_fs(dir, rel))?;
            if !got.eq_ignore_ascii_case(want.trim()) {
                return Err(UpdateError::Integrity(format!(
                    "hash mismatch for {rel} (got {got}, want {want})"
                )));
            }
        }
        Ok(())
    }
}

fn probe_readable(path: &Path) -> Result<()> {
    let mut f = fs::File::open(path)
        .map_err(|e| UpdateError::Integrity(format!("cannot open {}: {e}", path.display())))?;
    let mut byte = [0u8; 1];
    let n = f
        .read(&mut byte)
        .map_err(|e| UpdateError::Integrity(format!("cannot read {}: {e}", path.display())))?;
    tracing::trace!("probed {} ({n} byte)", path.display());
    Ok(())
}

fn manifest_path_to_fs(dir: &Path, rel: &str) -> PathBuf {
    rel.split(['/', '\\'])
        .filter(|seg| !seg.is_empty())
        .fold(dir.to_path_buf(), |acc, seg| acc.join(seg))
}

/// Uppercase hex SHA-256 of a file.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode_upper(hasher.finalize()))
}

pub fn load_manifest(path: &Path) -> Result<IntegrityManifest> {
    let txt = fs::read_to_string(path)?;
    let m: IntegrityManifest = serde_json::from_str(&txt)
        .with_context(|| format!("invalid integrity manifest {}", path.display()))?;
    Ok(m)
}

pub fn write_manifest(dir: &Path, manifest: &IntegrityManifest) -> Result<()> {
    fs::write(dir.join(INTEGRITY_FILE), serde_json::to_vec_pretty(manifest)?)?;
    Ok(())
}

/// Hash every file under `dir`, skipping top-level names in `exclude`
/// (the manifest itself is always skipped).
pub fn compute_manifest(dir: &Path, exclude: &[&str]) -> Result<IntegrityManifest> {
    let skipped = |e: &DirEntry| {
        e.depth() == 1
            && e.file_name()
                .to_str()
                .map_or(false, |n| n == INTEGRITY_FILE || exclude.contains(&n))
    };

    let mut out = IntegrityManifest::new();
    for entry in WalkDir::new(dir).min_depth(1).into_iter().filter_entry(|e| !skipped(e)) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("{} outside {}", entry.path().display(), dir.display()))?;
        let key = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(key, hash_file(entry.path())?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 3] = ["Lodestar.dll", "Lodestar.Injector.exe", "Lodestar.Interop.dll"];

    fn verifier() -> HashVerifier {
        HashVerifier::new(REQUIRED.iter().map(|s| s.to_string()).collect())
    }

    fn install(dir: &Path) {
        for (i, name) in REQUIRED.iter().enumerate() {
            fs::write(dir.join(name), format!("payload-{i}")).unwrap();
        }
        fs::create_dir_all(dir.join("lib/net8.0")).unwrap();
        fs::write(dir.join("lib/net8.0/extra.dll"), b"extra").unwrap();
        let m = compute_manifest(dir, &[]).unwrap();
        write_manifest(dir, &m).unwrap();
    }

    #[test]
    fn sha256_is_uppercase_hex() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("hello.txt");
        fs::write(&p, b"hello world").unwrap();
        assert_eq!(
            hash_file(&p).unwrap(),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        );
    }

    #[test]
    fn clean_install_verifies() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path());

        let m = load_manifest(&dir.path().join(INTEGRITY_FILE)).unwrap();
        assert!(m.contains_key("lib/net8.0/extra.dll"));
        assert!(!m.contains_key(INTEGRITY_FILE));
        assert!(verifier().verify(dir.path()));
    }

    #[test]
    fn lowercase_manifest_digests_still_match() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path());
        let lowered: IntegrityManifest = load_manifest(&dir.path().join(INTEGRITY_FILE))
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k, v.to_lowercase()))
            .collect();
        write_manifest(dir.path(), &lowered).unwrap();
        assert!(verifier().verify(dir.path()));
    }

    #[test]
    fn any_altered_entry_fails() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path());
        let entries: Vec<String> = load_manifest(&dir.path().join(INTEGRITY_FILE))
            .unwrap()
            .into_keys()
            .collect();

        for rel in entries {
            let path = manifest_path_to_fs(dir.path(), &rel);
            let original = fs::read(&path).unwrap();
            let mut flipped = original.clone();
            flipped[0] ^= 0x01;
            fs::write(&path, &flipped).unwrap();
            assert!(!verifier().verify(dir.path()), "{rel} change went unnoticed");
            fs::write(&path, &original).unwrap();
        }
        assert!(verifier().verify(dir.path()));
    }

    #[test]
    fn missing_pieces_fail_without_error() {
        let dir = tempfile::tempdir().unwrap();
        install(dir.path());

        fs::remove_file(dir.path().join("lib/net8.0/extra.dll")).unwrap();
        assert!(!verifier().verify(dir.path()));

        let dir = tempfile::tempdir().unwrap();
        install(dir.path());
        fs::remove_file(dir.path().join(INTEGRITY_FILE)).unwrap();
        assert!(!verifier().verify(dir.path()));

        let dir = tempfile::tempdir().unwrap();
        install(dir.path());
        fs::remove_file(dir.path().join("Lodestar.Interop.dll")).unwrap();
        assert!(!verifier().verify(dir.path()));

        assert!(!verifier().verify(&dir.path().join("does-not-exist")));
    }

    #[test]
    fn probe_free_verifier_only_needs_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), b"a").unwrap();
        write_manifest(dir.path(), &compute_manifest(dir.path(), &[]).unwrap()).unwrap();
        assert!(HashVerifier::default().verify(dir.path()));
    }

    #[test]
    fn excludes_apply_only_at_top_level() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("version"), b"8.0.1").unwrap();
        fs::create_dir_all(dir.path().join("shared/C/8.0.1")).unwrap();
        fs::write(dir.path().join("shared/C/8.0.1/version"), b"inner").unwrap();
        fs::write(dir.path().join("shared/C/8.0.1/hashes.json"), b"{}").unwrap();

        let m = compute_manifest(dir.path(), &["version"]).unwrap();
        let keys: Vec<&str> = m.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["shared/C/8.0.1/hashes.json", "shared/C/8.0.1/version"]
        );
    }
}
