//! Cache of remote-assigned identifiers.
//!
//! Resolving a workspace, peer, or session name to its remote id costs a
//! network round trip, so resolved ids are kept in `id-cache.json`. Every
//! entry remembers the *name* it was resolved from; a lookup only hits when
//! that name equals the one in effect now. Renaming a peer or switching the
//! session strategy therefore never hands back an id that belongs to a
//! different identity.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MemsyncError;
use crate::state_dir::StateDir;
use crate::store::DocumentStore;
use crate::text::path_key;

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamedId {
    name: String,
    id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionEntry {
    name: String,
    id: String,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdCacheDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace: Option<NamedId>,
    /// Peer name -> id.
    #[serde(default)]
    peers: BTreeMap<String, String>,
    /// Working directory -> session.
    #[serde(default)]
    sessions: BTreeMap<String, SessionEntry>,
}

// ============================================================================
// IdKind
// ============================================================================

/// What an identifier names, together with the name currently in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind<'a> {
    Workspace(&'a str),
    Peer(&'a str),
    /// The session for a working directory under its resolved name.
    Session { cwd: &'a Path, name: &'a str },
}

// ============================================================================
// IdentifierCache
// ============================================================================

#[derive(Debug, Clone)]
pub struct IdentifierCache {
    store: DocumentStore<IdCacheDocument>,
}

impl IdentifierCache {
    pub fn new(state: &StateDir) -> Self {
        Self {
            store: DocumentStore::new(state.id_cache_path()),
        }
    }

    /// Cached id for `kind`, if its recorded name matches.
    pub fn get(&self, kind: IdKind<'_>) -> Option<String> {
        let doc = self.store.load();
        let hit = match kind {
            IdKind::Workspace(name) => doc
                .workspace
                .filter(|w| w.name == name)
                .map(|w| w.id),
            IdKind::Peer(name) => doc.peers.get(name).cloned(),
            IdKind::Session { cwd, name } => doc
                .sessions
                .get(&path_key(cwd))
                .filter(|s| s.name == name)
                .map(|s| s.id.clone()),
        };
        if hit.is_none() {
            tracing::debug!("Identifier cache miss for {:?}", kind);
        }
        hit
    }

    pub fn set(&self, kind: IdKind<'_>, id: impl Into<String>) -> Result<(), MemsyncError> {
        let id = id.into();
        self.store.update(|doc| match kind {
            IdKind::Workspace(name) => {
                // Sessions belong to the workspace they were created in.
                if doc.workspace.as_ref().is_some_and(|w| w.name != name) {
                    doc.sessions.clear();
                }
                doc.workspace = Some(NamedId {
                    name: name.to_string(),
                    id,
                });
            }
            IdKind::Peer(name) => {
                doc.peers.insert(name.to_string(), id);
            }
            IdKind::Session { cwd, name } => {
                doc.sessions.insert(
                    path_key(cwd),
                    SessionEntry {
                        name: name.to_string(),
                        id,
                        updated_at: Utc::now(),
                    },
                );
            }
        })
    }

    /// Forget the workspace id and every session id scoped to it.
    pub fn invalidate_workspace(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| {
            doc.workspace = None;
            doc.sessions.clear();
        })
    }

    pub fn invalidate_peers(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| doc.peers.clear())
    }

    pub fn invalidate_sessions(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| doc.sessions.clear())
    }

    /// Forget everything.
    pub fn clear(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| *doc = IdCacheDocument::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(temp: &TempDir) -> IdentifierCache {
        IdentifierCache::new(&StateDir::at(temp.path()))
    }

    #[test]
    fn test_workspace_hit_requires_matching_name() {
        let temp = TempDir::new().unwrap();
        let ids = cache(&temp);
        ids.set(IdKind::Workspace("claude_code"), "ws-1").unwrap();

        assert_eq!(ids.get(IdKind::Workspace("claude_code")), Some("ws-1".to_string()));
        assert_eq!(ids.get(IdKind::Workspace("other")), None);
    }

    #[test]
    fn test_session_name_mismatch_forces_miss() {
        let temp = TempDir::new().unwrap();
        let ids = cache(&temp);
        let cwd = Path::new("/work/repo");
        ids.set(IdKind::Session { cwd, name: "alice-repo" }, "s-1").unwrap();

        assert_eq!(
            ids.get(IdKind::Session { cwd, name: "alice-repo" }),
            Some("s-1".to_string())
        );
        assert_eq!(ids.get(IdKind::Session { cwd, name: "alice-repo-dev" }), None);
        assert_eq!(
            ids.get(IdKind::Session {
                cwd: Path::new("/elsewhere"),
                name: "alice-repo"
            }),
            None
        );
    }

    #[test]
    fn test_invalidate_workspace_drops_sessions() {
        let temp = TempDir::new().unwrap();
        let ids = cache(&temp);
        let cwd = Path::new("/w");
        ids.set(IdKind::Workspace("ws"), "ws-1").unwrap();
        ids.set(IdKind::Peer("alice"), "p-1").unwrap();
        ids.set(IdKind::Session { cwd, name: "s" }, "s-1").unwrap();

        ids.invalidate_workspace().unwrap();
        assert_eq!(ids.get(IdKind::Workspace("ws")), None);
        assert_eq!(ids.get(IdKind::Session { cwd, name: "s" }), None);
        assert_eq!(ids.get(IdKind::Peer("alice")), Some("p-1".to_string()));
    }

    #[test]
    fn test_switching_workspace_drops_sessions() {
        let temp = TempDir::new().unwrap();
        let ids = cache(&temp);
        let cwd = Path::new("/w");
        ids.set(IdKind::Workspace("a"), "ws-a").unwrap();
        ids.set(IdKind::Session { cwd, name: "s" }, "s-1").unwrap();

        ids.set(IdKind::Workspace("a"), "ws-a").unwrap();
        assert!(ids.get(IdKind::Session { cwd, name: "s" }).is_some());

        ids.set(IdKind::Workspace("b"), "ws-b").unwrap();
        assert!(ids.get(IdKind::Session { cwd, name: "s" }).is_none());
    }

    #[test]
    fn test_invalidate_peers_and_clear() {
        let temp = TempDir::new().unwrap();
        let ids = cache(&temp);
        ids.set(IdKind::Workspace("ws"), "ws-1").unwrap();
        ids.set(IdKind::Peer("alice"), "p-1").unwrap();
        ids.set(IdKind::Peer("claude"), "p-2").unwrap();

        ids.invalidate_peers().unwrap();
        assert_eq!(ids.get(IdKind::Peer("alice")), None);
        assert_eq!(ids.get(IdKind::Workspace("ws")), Some("ws-1".to_string()));

        ids.clear().unwrap();
        assert_eq!(ids.get(IdKind::Workspace("ws")), None);
    }
}
