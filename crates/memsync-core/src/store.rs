//! File-as-database document storage.
//!
//! Every JSON document in the state directory is accessed through a
//! [`DocumentStore`]. It offers exactly two operations:
//!
//! - [`DocumentStore::load`] reads the current document, degrading to the
//!   default value when the file is missing or corrupt.
//! - [`DocumentStore::update`] re-reads the document, applies a mutation, and
//!   atomically replaces the file (temp file + rename).
//!
//! There is deliberately no "write this value" operation: independent
//! processes share these files, so every write starts from what is on disk
//! right now rather than from a snapshot taken earlier in the invocation.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::errors::MemsyncError;

// ============================================================================
// Atomic write
// ============================================================================

/// Atomically replace `path` with `contents`.
///
/// The bytes go to a uniquely named sibling temp file, are synced, and the
/// temp file is renamed over the target. Readers see either the old or the
/// new document, never a partial one.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), MemsyncError> {
    let io_err = |e: std::io::Error, what: &str| MemsyncError::StoreIo {
        path: path.to_path_buf(),
        reason: format!("{}: {}", what, e),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(e, "failed to create parent directory"))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    // Unique per writer so concurrent invocations never share a temp file.
    let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|e| io_err(e, "failed to create temp file"))?;
        {
            let mut writer = BufWriter::new(&mut file);
            writer
                .write_all(contents)
                .map_err(|e| io_err(e, "failed to write temp file"))?;
            writer
                .flush()
                .map_err(|e| io_err(e, "failed to flush temp file"))?;
        }
        file.sync_all()
            .map_err(|e| io_err(e, "failed to sync temp file"))?;
        fs::rename(&tmp_path, path).map_err(|e| io_err(e, "failed to replace document"))
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

// ============================================================================
// DocumentStore
// ============================================================================

/// Typed access to one JSON document on disk.
#[derive(Debug, Clone)]
pub struct DocumentStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Create a store for the document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document.
    ///
    /// A missing file yields the default silently. An unreadable or corrupt
    /// file yields the default with a warning; the file itself is left alone
    /// until the next successful [`update`](Self::update) replaces it.
    pub fn load(&self) -> T {
        match self.try_load() {
            Ok(Some(doc)) => doc,
            Ok(None) => T::default(),
            Err(e) => {
                tracing::warn!("{}; using defaults", e);
                T::default()
            }
        }
    }

    /// Load the document, distinguishing missing from corrupt.
    pub fn try_load(&self) -> Result<Option<T>, MemsyncError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(MemsyncError::StoreIo {
                    path: self.path.clone(),
                    reason: e.to_string(),
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| MemsyncError::StoreParse {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Re-read the document, apply `f`, and atomically write it back.
    ///
    /// Returns whatever `f` returns.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, MemsyncError> {
        let mut doc = self.load();
        let out = f(&mut doc);
        let bytes = serde_json::to_vec_pretty(&doc).map_err(|e| MemsyncError::StoreParse {
            path: self.path.clone(),
            reason: format!("failed to serialize: {}", e),
        })?;
        atomic_write(&self.path, &bytes)?;
        Ok(out)
    }
}
