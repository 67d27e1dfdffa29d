use crate::errors::{Result, UpdateError};
use std::fs;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Wipe `dest` and unpack the whole archive into it.
pub fn extract_fresh(zip_path: &Path, dest: &Path) -> Result<()> {
    let f = fs::File::open(zip_path)?;
    let mut archive = ZipArchive::new(f)?;

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let rel = file.enclosed_name().map(Path::to_path_buf).ok_or_else(|| {
            UpdateError::Msg(format!("archive entry escapes target: {}", file.name()))
        })?;
        let outpath = dest.join(rel);
        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = fs::File::create(&outpath)?;
            std::io::copy(&mut file, &mut out)?;
        }
    }
    Ok(())
}

/// Internal prefixes of a component package that make it into the runtime.
pub fn package_subtrees(platform: &str, framework: &str) -> [String; 2] {
    [
        format!("runtimes/{platform}/native/"),
        format!("runtimes/{platform}/lib/net{framework}/"),
    ]
}

/// Copy the native + lib subtrees of a component package, flattened, into
/// `<target>/shared/<component>/<version>/`. Returns the number of files placed.
pub fn extract_package_subtree(
    package_path: &Path,
    target: &Path,
    version: &str,
    framework: &str,
    component: &str,
    platform: &str,
) -> Result<usize> {
    let f = fs::File::open(package_path)?;
    let mut archive = ZipArchive::new(f)?;

    let out_dir: PathBuf = target.join("shared").join(component).join(version);
    fs::create_dir_all(&out_dir)?;

    let prefixes = package_subtrees(platform, framework);
    let mut placed = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = file.name().replace('\\', "/");
        if !prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            continue;
        }
        // directory entries have no leaf
        let leaf = match name.rsplit('/').next() {
            Some(l) if !l.is_empty() && l != "." && l != ".." => l.to_string(),
            _ => continue,
        };

        let mut out = fs::File::create(out_dir.join(&leaf))?;
        std::io::copy(&mut file, &mut out)?;
        placed += 1;
    }

    Ok(placed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(fs::File::create(path).unwrap());
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, FileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, FileOptions::default()).unwrap();
                zip.write_all(data).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn fresh_extract_removes_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("payload.zip");
        write_zip(
            &zip_path,
            &[("Lodestar.dll", b"a"), ("sub/", b""), ("sub/inner.txt", b"b")],
        );

        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("stale.dll"), b"old").unwrap();

        extract_fresh(&zip_path, &dest).unwrap();
        assert!(!dest.join("stale.dll").exists());
        assert_eq!(fs::read(dest.join("Lodestar.dll")).unwrap(), b"a");
        assert_eq!(fs::read(dest.join("sub/inner.txt")).unwrap(), b"b");
    }

    #[test]
    fn subtree_extract_flattens_allowed_prefixes_only() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("core.nupkg");
        write_zip(
            &pkg,
            &[
                ("runtimes/win-x64/native/", b""),
                ("runtimes/win-x64/native/hostfxr.dll", b"fxr"),
                ("runtimes/win-x64/native/nested/deep/coreclr.dll", b"clr"),
                ("runtimes/win-x64/lib/net8.0/System.Runtime.dll", b"rt"),
                ("runtimes/win-x64/lib/net7.0/Old.dll", b"old"),
                ("runtimes/linux-x64/native/libhostfxr.so", b"so"),
                ("ref/net8.0/System.Runtime.dll", b"ref"),
                ("package.nuspec", b"<xml/>"),
            ],
        );

        let root = dir.path().join("runtime");
        let n = extract_package_subtree(&pkg, &root, "8.0.1", "8.0", "Microsoft.NETCore.App", "win-x64")
            .unwrap();
        assert_eq!(n, 3);

        let out = root.join("shared/Microsoft.NETCore.App/8.0.1");
        assert_eq!(fs::read(out.join("hostfxr.dll")).unwrap(), b"fxr");
        assert_eq!(fs::read(out.join("coreclr.dll")).unwrap(), b"clr");
        assert_eq!(fs::read(out.join("System.Runtime.dll")).unwrap(), b"rt");
        assert!(!out.join("nested").exists());
        assert!(!out.join("Old.dll").exists());
        assert!(!out.join("libhostfxr.so").exists());
    }

    #[test]
    fn subtree_extract_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("core.nupkg");
        write_zip(&pkg, &[("runtimes/win-x64/native/hostfxr.dll", b"new")]);

        let root = dir.path().join("runtime");
        let out = root.join("shared/C/1.0.0");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("hostfxr.dll"), b"old").unwrap();

        extract_package_subtree(&pkg, &root, "1.0.0", "1.0", "C", "win-x64").unwrap();
        assert_eq!(fs::read(out.join("hostfxr.dll")).unwrap(), b"new");
    }

    #[test]
    fn fresh_extract_rejects_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("evil.zip");
        write_zip(&zip_path, &[("Lodestar.dll", b"a"), ("../evil.dll", b"x")]);

        let dest = dir.path().join("hooks/9.1.0.0");
        let err = extract_fresh(&zip_path, &dest).unwrap_err();
        assert!(err.to_string().contains("escapes"), "{err}");
        assert!(!dir.path().join("hooks/evil.dll").exists());
        assert!(!dir.path().join("evil.dll").exists());
    }

    #[test]
    fn subtree_extract_streams_large_entries() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("big.nupkg");
        let big = vec![7u8; 3 * 1024 * 1024];
        write_zip(&pkg, &[("runtimes/win-x64/native/big.dll", big.as_slice())]);

        let root = dir.path().join("runtime");
        assert_eq!(
            extract_package_subtree(&pkg, &root, "8.0.1", "8.0", "C", "win-x64").unwrap(),
            1
        );
        assert_eq!(fs::read(root.join("shared/C/8.0.1/big.dll")).unwrap(), big);
    }
}
