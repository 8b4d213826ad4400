//! Content fingerprints for documents and their attachment directories.
//!
//! Hashing uses BLAKE3 streamed through a buffered reader, so large binary
//! attachments never need to be held in memory.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Utc};
use docweave_shared::{DocweaveError, Fingerprint, Result};
use walkdir::WalkDir;

/// Fingerprint a single file: BLAKE3 hex digest, byte size and modification time.
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).map_err(|e| DocweaveError::io(path, e))?;
    let metadata = file.metadata().map_err(|e| DocweaveError::io(path, e))?;

    let mut hasher = blake3::Hasher::new();
    let mut reader = BufReader::new(file);
    std::io::copy(&mut reader, &mut hasher).map_err(|e| DocweaveError::io(path, e))?;

    let modified = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    Ok(Fingerprint {
        hash: hasher.finalize().to_hex().to_string(),
        size: metadata.len(),
        modified,
    })
}

/// Fingerprint every regular file under `dir`, keyed by its `/`-separated path
/// relative to `dir`.
///
/// A missing directory yields an empty map.
pub fn fingerprint_dir(dir: &Path) -> Result<BTreeMap<String, Fingerprint>> {
    let mut out = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(out);
    }

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            DocweaveError::io(path, std::io::Error::other(e.to_string()))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.insert(name, fingerprint(entry.path())?);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("docweave-fp-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn same_bytes_same_fingerprint() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("a.txt"), "hello").unwrap();
        std::fs::write(tmp.join("b.txt"), "hello").unwrap();

        let a = fingerprint(&tmp.join("a.txt")).unwrap();
        let b = fingerprint(&tmp.join("b.txt")).unwrap();
        assert!(a.same_content(&b));
        assert_eq!(a.size, 5);
        assert_eq!(a.hash.len(), 64);

        std::fs::write(tmp.join("b.txt"), "hellp").unwrap();
        let b = fingerprint(&tmp.join("b.txt")).unwrap();
        assert!(!a.same_content(&b));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = temp_dir();
        let err = fingerprint(&tmp.join("nope.md")).unwrap_err();
        assert!(matches!(err, DocweaveError::Io { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn directory_fingerprint_uses_relative_names() {
        let tmp = temp_dir();
        std::fs::create_dir_all(tmp.join("b/media")).unwrap();
        std::fs::write(tmp.join("b/img.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(tmp.join("b/media/fig1.png"), [3u8]).unwrap();

        let map = fingerprint_dir(&tmp.join("b")).unwrap();
        let names: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["img.png", "media/fig1.png"]);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_directory_is_empty_set() {
        let tmp = temp_dir();
        let map = fingerprint_dir(&tmp.join("absent")).unwrap();
        assert!(map.is_empty());
        let _ = std::fs::remove_dir_all(&tmp);
    }
}
