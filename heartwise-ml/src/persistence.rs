//! Artifact persistence — atomic writes for reports, JSON artifacts and hashes.
//!
//! Every file the pipeline produces goes through [`atomic_write`], so a crash
//! mid-run never leaves a half-written CSV or transformer next to a good one.

use crate::error::MlError;
use sha2::{Digest, Sha256};
use std::io;
use std::path::Path;

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON, writes to a `.tmp` sibling file,
/// then renames onto the target path. Creates parent directories if needed.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load and deserialize a JSON artifact.
///
/// A missing file is reported as [`MlError::FileNotFound`] rather than a bare
/// I/O error so callers can name the artifact they expected.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MlError> {
    if !path.exists() {
        return Err(MlError::FileNotFound(path.to_path_buf()));
    }
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Compute the SHA-256 hash of a file's contents.
pub fn hash_file(path: &Path) -> Result<String, MlError> {
    if !path.exists() {
        return Err(MlError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

/// Compute the SHA-256 hash of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Artifact {
        name: String,
        width: usize,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.json");

        let data = Artifact {
            name: "preprocessor".into(),
            width: 17,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Artifact = load_json(&path).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("reports").join("r.txt");

        atomic_write(&path, b"precision").unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_load_json_missing_names_path() {
        let err = load_json::<Artifact>(Path::new("/nonexistent/preprocessor.json")).unwrap_err();
        assert!(matches!(err, MlError::FileNotFound(p) if p.ends_with("preprocessor.json")));
    }

    #[test]
    fn test_hash_bytes_is_stable() {
        assert_eq!(hash_bytes(b"abc"), hash_bytes(b"abc"));
        assert_ne!(hash_bytes(b"abc"), hash_bytes(b"abd"));
        assert_eq!(hash_bytes(b"").len(), 64);
    }
}
