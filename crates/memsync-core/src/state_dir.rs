//! Per-user state directory resolution.
//!
//! This module provides the [`StateDir`] type which locates the directory
//! holding every memsync document and hands out the path of each file inside
//! it. File names are only spelled out in [`crate::constants`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    ACTIVITY_LOG_FILENAME, CONFIG_FILENAME, CONTEXT_CACHE_FILENAME, ENV_HOME, GIT_STATE_FILENAME,
    ID_CACHE_FILENAME, MESSAGE_QUEUE_FILENAME, STATE_DIR_NAME,
};
use crate::environment::Environment;
use crate::errors::MemsyncError;

// ============================================================================
// StateDir
// ============================================================================

/// The resolved state directory.
///
/// Resolution order: explicit path, then `MEMSYNC_HOME`, then `~/.memsync`.
/// The directory is not created until a document is first written.
///
/// # Example
///
/// ```ignore
/// use memsync_core::{Environment, StateDir};
///
/// let state = StateDir::resolve(None, &Environment::from_process())?;
/// println!("Queue: {:?}", state.message_queue_path());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve the state directory.
    ///
    /// # Errors
    ///
    /// Returns [`MemsyncError::StateDirUnavailable`] if no override is given
    /// and the home directory cannot be determined.
    pub fn resolve(explicit: Option<&Path>, env: &Environment) -> Result<Self, MemsyncError> {
        if let Some(path) = explicit {
            return Ok(Self::at(path));
        }
        if let Some(home) = env.get(ENV_HOME) {
            return Ok(Self::at(home));
        }
        let home = dirs::home_dir().ok_or_else(|| {
            MemsyncError::StateDirUnavailable(format!(
                "could not determine the home directory; set {}",
                ENV_HOME
            ))
        })?;
        Ok(Self::at(home.join(STATE_DIR_NAME)))
    }

    /// Use `root` as the state directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root of the state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist.
    pub fn ensure_exists(&self) -> Result<(), MemsyncError> {
        fs::create_dir_all(&self.root).map_err(|e| MemsyncError::StoreIo {
            path: self.root.clone(),
            reason: format!("failed to create state directory: {}", e),
        })
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILENAME)
    }

    pub fn id_cache_path(&self) -> PathBuf {
        self.root.join(ID_CACHE_FILENAME)
    }

    pub fn context_cache_path(&self) -> PathBuf {
        self.root.join(CONTEXT_CACHE_FILENAME)
    }

    pub fn message_queue_path(&self) -> PathBuf {
        self.root.join(MESSAGE_QUEUE_FILENAME)
    }

    pub fn git_state_path(&self) -> PathBuf {
        self.root.join(GIT_STATE_FILENAME)
    }

    pub fn activity_log_path(&self) -> PathBuf {
        self.root.join(ACTIVITY_LOG_FILENAME)
    }
}
