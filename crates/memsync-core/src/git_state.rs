//! Repository snapshots and change detection.
//!
//! memsync does not talk to git itself. Callers capture a [`GitSnapshot`] for
//! the working directory however they like; this module remembers the last
//! snapshot per directory and describes what changed since then, so the
//! hooks can tell the assistant about work that happened outside the
//! conversation (a branch switch in another terminal, commits pulled in, and
//! so on).
//!
//! Only the single previous snapshot is compared. A tree that went dirty,
//! clean, and dirty again between two invocations reports nothing for the
//! intermediate states.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MemsyncError;
use crate::state_dir::StateDir;
use crate::store::DocumentStore;
use crate::text::path_key;

/// Maximum number of file names listed in a `files_changed` description.
const MAX_LISTED_FILES: usize = 10;

// ============================================================================
// GitSnapshot
// ============================================================================

/// Repository state captured for one working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSnapshot {
    pub branch: String,
    /// Head commit id.
    pub commit: String,
    /// Subject line of the head commit.
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub dirty: bool,
    #[serde(default)]
    pub dirty_files: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

impl GitSnapshot {
    /// A clean snapshot captured now.
    pub fn new(
        branch: impl Into<String>,
        commit: impl Into<String>,
        commit_message: impl Into<String>,
    ) -> Self {
        Self {
            branch: branch.into(),
            commit: commit.into(),
            commit_message: commit_message.into(),
            dirty: false,
            dirty_files: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Mark the snapshot dirty with the given files.
    pub fn with_dirty_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dirty_files = files.into_iter().map(Into::into).collect();
        self.dirty = true;
        self
    }
}

// ============================================================================
// GitStateChange
// ============================================================================

/// One observed difference between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GitStateChange {
    /// First snapshot seen for the directory.
    Initial { branch: String, commit: String },
    BranchSwitch { from: String, to: String },
    /// Head moved; `message` is the new head's subject.
    NewCommits {
        from: String,
        to: String,
        message: String,
    },
    /// The tree went from clean to dirty.
    FilesChanged { files: Vec<String> },
}

fn short_commit(id: &str) -> String {
    id.chars().take(7).collect()
}

impl fmt::Display for GitStateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial { branch, commit } => {
                write!(f, "On branch {} at {}", branch, short_commit(commit))
            }
            Self::BranchSwitch { from, to } => {
                write!(f, "Branch switched from {} to {}", from, to)
            }
            Self::NewCommits { from, to, message } => {
                write!(
                    f,
                    "New commits {}..{}: {}",
                    short_commit(from),
                    short_commit(to),
                    message
                )
            }
            Self::FilesChanged { files } => {
                write!(f, "Uncommitted changes in {} file(s)", files.len())?;
                if !files.is_empty() {
                    let listed: Vec<&str> =
                        files.iter().take(MAX_LISTED_FILES).map(String::as_str).collect();
                    write!(f, ": {}", listed.join(", "))?;
                    if files.len() > MAX_LISTED_FILES {
                        write!(f, " and {} more", files.len() - MAX_LISTED_FILES)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// Describe the changes between `previous` and `current`.
///
/// With no previous snapshot the result is exactly one
/// [`GitStateChange::Initial`]. Otherwise changes appear in the order
/// branch switch, new commits, files changed; the last only on a
/// clean-to-dirty edge.
pub fn diff(previous: Option<&GitSnapshot>, current: &GitSnapshot) -> Vec<GitStateChange> {
    let Some(previous) = previous else {
        return vec![GitStateChange::Initial {
            branch: current.branch.clone(),
            commit: current.commit.clone(),
        }];
    };

    let mut changes = Vec::new();
    if previous.branch != current.branch {
        changes.push(GitStateChange::BranchSwitch {
            from: previous.branch.clone(),
            to: current.branch.clone(),
        });
    }
    if previous.commit != current.commit {
        changes.push(GitStateChange::NewCommits {
            from: previous.commit.clone(),
            to: current.commit.clone(),
            message: current.commit_message.clone(),
        });
    }
    if !previous.dirty && current.dirty {
        changes.push(GitStateChange::FilesChanged {
            files: current.dirty_files.clone(),
        });
    }
    changes
}

// ============================================================================
// GitStateCache
// ============================================================================

type GitStateDocument = BTreeMap<String, GitSnapshot>;

/// Last observed snapshot per working directory.
#[derive(Debug, Clone)]
pub struct GitStateCache {
    store: DocumentStore<GitStateDocument>,
}

impl GitStateCache {
    pub fn new(state: &StateDir) -> Self {
        Self {
            store: DocumentStore::new(state.git_state_path()),
        }
    }

    pub fn get(&self, cwd: &Path) -> Option<GitSnapshot> {
        self.store.load().remove(&path_key(cwd))
    }

    pub fn set(&self, cwd: &Path, snapshot: GitSnapshot) -> Result<(), MemsyncError> {
        self.store.update(|doc| {
            doc.insert(path_key(cwd), snapshot);
        })
    }

    /// Diff `current` against the cached snapshot, then cache `current`.
    pub fn observe(
        &self,
        cwd: &Path,
        current: GitSnapshot,
    ) -> Result<Vec<GitStateChange>, MemsyncError> {
        let previous = self.get(cwd);
        let changes = diff(previous.as_ref(), &current);
        tracing::debug!(
            "Git state for {}: {} change(s)",
            cwd.display(),
            changes.len()
        );
        self.set(cwd, current)?;
        Ok(changes)
    }
}
