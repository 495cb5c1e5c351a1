//! Checkpoint files: JSON payload plus a manifest with its blake3 hash
//!
//! Layout for a payload at `{dir}/{name}.json`:
//! ```text
//! {dir}/
//! ├── {name}.json            # payload
//! └── {name}.manifest.json   # content hash + creation time
//! ```
//! Both files are written to a `.tmp` sibling first and renamed into place.

use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bump when the manifest layout changes.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Error from saving or loading a checkpoint file.
#[derive(Debug)]
pub enum CheckpointError {
    /// No payload at the path (cold start).
    NotFound(PathBuf),
    Io { path: PathBuf, source: io::Error },
    Encode(serde_json::Error),
    /// Payload exists but cannot be trusted or decoded.
    Corrupt { path: PathBuf, reason: String },
}

impl std::fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "no checkpoint at {}", p.display()),
            Self::Io { path, source } => write!(f, "IO on {}: {source}", path.display()),
            Self::Encode(e) => write!(f, "encode: {e}"),
            Self::Corrupt { path, reason } => {
                write!(f, "corrupt checkpoint {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl CheckpointError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Manifest stored next to a checkpoint payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub format_version: u32,
    /// Payload file name (no directory).
    pub file: String,
    /// Full hex blake3 hash of the payload bytes.
    pub content_hash: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// `{name}.json` → `{name}.manifest.json`
pub fn manifest_path(payload: &Path) -> PathBuf {
    let stem = payload
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    payload.with_file_name(format!("{stem}.manifest.json"))
}

/// Write `bytes` to `path` via a `.tmp` sibling and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CheckpointError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CheckpointError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes).map_err(|e| CheckpointError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| CheckpointError::io(path, e))
}

/// Serialize `value` to `path` and write its manifest.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<CheckpointManifest, CheckpointError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(CheckpointError::Encode)?;
    let h = blake3::hash(&bytes);
    write_atomic(path, &bytes)?;

    let manifest = CheckpointManifest {
        format_version: CURRENT_FORMAT_VERSION,
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        content_hash: h.to_hex().to_string(),
        created_at: chrono::Utc::now(),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(CheckpointError::Encode)?;
    write_atomic(&manifest_path(path), &manifest_bytes)?;

    log::debug!("wrote {} ({})", path.display(), &h.to_hex()[..8]);
    Ok(manifest)
}

/// Read a payload written by [`save_json`], verifying its hash.
///
/// A payload without a manifest is accepted with a warning.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, CheckpointError> {
    let bytes = std::fs::read(path).map_err(|e| CheckpointError::io(path, e))?;

    let mpath = manifest_path(path);
    match std::fs::read(&mpath) {
        Ok(raw) => {
            let manifest: CheckpointManifest =
                serde_json::from_slice(&raw).map_err(|e| CheckpointError::Corrupt {
                    path: mpath.clone(),
                    reason: format!("unreadable manifest: {e}"),
                })?;
            if manifest.format_version != CURRENT_FORMAT_VERSION {
                return Err(CheckpointError::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!(
                        "format_version {} != current {CURRENT_FORMAT_VERSION}",
                        manifest.format_version
                    ),
                });
            }
            let actual = blake3::hash(&bytes).to_hex().to_string();
            if actual != manifest.content_hash {
                return Err(CheckpointError::Corrupt {
                    path: path.to_path_buf(),
                    reason: format!(
                        "content hash {} != manifest {}",
                        &actual[..8],
                        manifest.content_hash.get(..8).unwrap_or(&manifest.content_hash)
                    ),
                });
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::warn!("{}: no manifest, loading unverified", path.display());
        }
        Err(e) => return Err(CheckpointError::io(&mpath, e)),
    }

    serde_json::from_slice(&bytes).map_err(|e| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
