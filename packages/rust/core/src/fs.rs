//! Filesystem helpers shared by the phases.

use std::path::Path;

use docweave_shared::{DocweaveError, Result};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// Write `content` to a `.name.tmp` sibling, then rename it over `target`.
/// Returns the SHA-256 hex digest of the content.
pub(crate) fn write_atomic(target: &Path, content: &[u8]) -> Result<String> {
    let dir = target
        .parent()
        .ok_or_else(|| DocweaveError::validation(format!("{} has no parent", target.display())))?;
    std::fs::create_dir_all(dir).map_err(|e| DocweaveError::io(dir, e))?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| DocweaveError::io(&temp, e))?;
    std::fs::rename(&temp, target).map_err(|e| DocweaveError::io(target, e))?;

    let mut hasher = Sha256::new();
    hasher.update(content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write JSON (pretty-printed, trailing newline) atomically.
pub(crate) fn write_json<T: serde::Serialize>(target: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| DocweaveError::State(format!("serialize {}: {e}", target.display())))?;
    json.push('\n');
    write_atomic(target, json.as_bytes())?;
    Ok(())
}

/// Read and deserialize a JSON file.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| DocweaveError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DocweaveError::validation(format!("invalid {}: {e}", path.display())))
}

/// Remove a directory tree if it exists.
pub(crate) fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DocweaveError::io(dir, e)),
    }
}

/// Remove a file if it exists.
pub(crate) fn remove_file_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DocweaveError::io(path, e)),
    }
}

/// Replace `dst` with a copy of `src` (hidden entries skipped).
/// A missing `src` leaves `dst` absent.
pub(crate) fn mirror_dir(src: &Path, dst: &Path) -> Result<()> {
    remove_dir_if_exists(dst)?;
    if !src.is_dir() {
        return Ok(());
    }

    let walker = WalkDir::new(src).into_iter().filter_entry(|e| {
        e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.')
    });
    for entry in walker {
        let entry = entry.map_err(|e| {
            DocweaveError::io(src, std::io::Error::other(e.to_string()))
        })?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| DocweaveError::io(&target, e))?;
        } else if entry.file_type().is_file() {
            std::fs::copy(entry.path(), &target).map_err(|e| DocweaveError::io(&target, e))?;
        }
    }
    Ok(())
}

/// `/`-separated form of a relative path.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-fs-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn atomic_write_replaces_and_hashes() {
        let tmp = temp_dir();
        let target = tmp.join("nested/out.md");
        write_atomic(&target, b"one").unwrap();
        let hash = write_atomic(&target, b"two").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "two");
        assert_eq!(hash.len(), 64);
        assert!(!tmp.join("nested/.out.md.tmp").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn mirror_replaces_stale_content() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("src/sub")).unwrap();
        std::fs::write(tmp.join("src/sub/a.txt"), "a").unwrap();
        std::fs::write(tmp.join("src/.hidden"), "h").unwrap();
        std::fs::create_dir_all(tmp.join("dst")).unwrap();
        std::fs::write(tmp.join("dst/stale.txt"), "old").unwrap();

        mirror_dir(&tmp.join("src"), &tmp.join("dst")).unwrap();
        assert!(tmp.join("dst/sub/a.txt").exists());
        assert!(!tmp.join("dst/stale.txt").exists());
        assert!(!tmp.join("dst/.hidden").exists());

        mirror_dir(&tmp.join("absent"), &tmp.join("dst")).unwrap();
        assert!(!tmp.join("dst").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
