//! Durable outbound message queue.
//!
//! Messages are appended to `message-queue.jsonl` *before* any network call
//! and removed only once the upload has been acknowledged. Each entry is a
//! single JSON object on its own line:
//!
//! ```text
//! {"id":"…","content":"…","peerId":"alice","cwd":"/work/repo","timestamp":"…","uploaded":false}
//! ```
//!
//! Appends are fsynced. Removal rewrites the file atomically and keeps every
//! other line byte-for-byte, including lines this version cannot parse.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::MemsyncError;
use crate::state_dir::StateDir;
use crate::store::atomic_write;
use crate::text::path_key;

// ============================================================================
// MessageId
// ============================================================================

/// Unique identifier for a queued message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Stable id for a stored line that carries none; the same text always
    /// yields the same id.
    fn for_line(line: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, line.as_bytes()).to_string())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

// ============================================================================
// QueuedMessage
// ============================================================================

/// A message waiting to be uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedMessage {
    /// Older entries may lack an id; one is derived from the line when read.
    #[serde(default)]
    pub id: MessageId,
    pub content: String,
    /// Remote peer id, or the peer name when the id was not yet known.
    pub peer_id: String,
    pub cwd: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub uploaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// One line of the queue file, parsed if possible.
enum QueueLine {
    Message(QueuedMessage, String),
    Malformed(String),
}

// ============================================================================
// MessageQueue
// ============================================================================

#[derive(Debug, Clone)]
pub struct MessageQueue {
    path: PathBuf,
}

impl MessageQueue {
    pub fn new(state: &StateDir) -> Self {
        Self {
            path: state.message_queue_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message and sync it to disk before returning.
    pub fn enqueue(
        &self,
        content: impl Into<String>,
        peer_id: impl Into<String>,
        cwd: &Path,
        instance_id: Option<&str>,
    ) -> Result<QueuedMessage, MemsyncError> {
        let message = QueuedMessage {
            id: MessageId::generate(),
            content: content.into(),
            peer_id: peer_id.into(),
            cwd: path_key(cwd),
            timestamp: Utc::now(),
            uploaded: false,
            instance_id: instance_id.map(str::to_string),
        };

        let io_err = |e: std::io::Error, what: &str| MemsyncError::StoreIo {
            path: self.path.clone(),
            reason: format!("{}: {}", what, e),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_err(e, "failed to create queue directory"))?;
        }

        let mut line = serde_json::to_string(&message)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| io_err(e, "failed to open queue"))?;
        file.write_all(line.as_bytes())
            .map_err(|e| io_err(e, "failed to append to queue"))?;
        file.sync_all()
            .map_err(|e| io_err(e, "failed to sync queue"))?;

        tracing::debug!("Queued message {} for {}", message.id, message.cwd);
        Ok(message)
    }

    /// Messages not yet uploaded, oldest first, optionally for one directory.
    pub fn list_pending(&self, cwd: Option<&Path>) -> Vec<QueuedMessage> {
        let key = cwd.map(path_key);
        self.read_lines()
            .into_iter()
            .filter_map(|line| match line {
                QueueLine::Message(m, _) => Some(m),
                QueueLine::Malformed(_) => None,
            })
            .filter(|m| !m.uploaded)
            .filter(|m| key.as_deref().is_none_or(|k| m.cwd == k))
            .collect()
    }

    pub fn pending_count(&self, cwd: Option<&Path>) -> usize {
        self.list_pending(cwd).len()
    }

    /// Remove `cwd`'s entries, or every entry when `cwd` is `None`.
    ///
    /// Returns the number of messages removed.
    pub fn mark_uploaded(&self, cwd: Option<&Path>) -> Result<usize, MemsyncError> {
        match cwd {
            None => {
                let removed = self.list_pending(None).len();
                if self.path.exists() {
                    atomic_write(&self.path, b"")?;
                }
                Ok(removed)
            }
            Some(cwd) => {
                let key = path_key(cwd);
                self.rewrite_without(|m| m.cwd == key)
            }
        }
    }

    /// Remove exactly the given messages.
    ///
    /// Messages appended after the caller listed the queue are never touched,
    /// even when they share a directory with the removed ones.
    pub fn remove(&self, ids: &[MessageId]) -> Result<usize, MemsyncError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.rewrite_without(|m| ids.contains(&m.id))
    }

    fn rewrite_without(
        &self,
        drop: impl Fn(&QueuedMessage) -> bool,
    ) -> Result<usize, MemsyncError> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let mut kept = String::new();
        for line in self.read_lines() {
            let raw = match line {
                QueueLine::Message(m, _) if drop(&m) => {
                    removed += 1;
                    continue;
                }
                QueueLine::Message(_, raw) => raw,
                QueueLine::Malformed(raw) => raw,
            };
            kept.push_str(&raw);
            kept.push('\n');
        }
        if removed > 0 {
            atomic_write(&self.path, kept.as_bytes())?;
            tracing::debug!("Removed {} uploaded message(s) from queue", removed);
        }
        Ok(removed)
    }

    fn read_lines(&self) -> Vec<QueueLine> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to open {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        let mut lines = Vec::new();
        for (line_num, line_result) in BufReader::new(file).lines().enumerate() {
            let line = match line_result {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(
                        "Failed to read line {} from {}: {}",
                        line_num + 1,
                        self.path.display(),
                        e
                    );
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<QueuedMessage>(&line) {
                Ok(mut m) => {
                    if m.id.as_str().is_empty() {
                        m.id = MessageId::for_line(&line);
                    }
                    lines.push(QueueLine::Message(m, line));
                }
                Err(e) => {
                    tracing::warn!(
                        "Skipping malformed line {} in {}: {}",
                        line_num + 1,
                        self.path.display(),
                        e
                    );
                    lines.push(QueueLine::Malformed(line));
                }
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn queue(temp: &TempDir) -> MessageQueue {
        MessageQueue::new(&StateDir::at(temp.path()))
    }

    #[test]
    fn test_message_id_generate() {
        let a = MessageId::generate();
        let b = MessageId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_enqueue_survives_reconstruction() {
        let temp = TempDir::new().unwrap();
        let cwd = Path::new("/work/a");
        queue(&temp).enqueue("one", "alice", cwd, None).unwrap();
        queue(&temp).enqueue("two", "alice", cwd, Some("inst-1")).unwrap();

        let pending = queue(&temp).list_pending(None);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].content, "one");
        assert_eq!(pending[1].instance_id.as_deref(), Some("inst-1"));
        assert!(pending.iter().all(|m| !m.uploaded));
    }

    #[test]
    fn test_mark_uploaded_is_directory_scoped() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        let a = Path::new("/work/a");
        let b = Path::new("/work/b");
        q.enqueue("a1", "p", a, None).unwrap();
        q.enqueue("b1", "p", b, None).unwrap();
        q.enqueue("a2", "p", a, None).unwrap();

        assert_eq!(q.mark_uploaded(Some(a)).unwrap(), 2);
        let left = q.list_pending(None);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "b1");
        assert_eq!(q.pending_count(Some(a)), 0);
    }

    #[test]
    fn test_mark_uploaded_all() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        q.enqueue("a", "p", Path::new("/a"), None).unwrap();
        q.enqueue("b", "p", Path::new("/b"), None).unwrap();
        assert_eq!(q.mark_uploaded(None).unwrap(), 2);
        assert!(q.list_pending(None).is_empty());
    }

    #[test]
    fn test_malformed_lines_skipped_and_preserved() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        q.enqueue("a", "p", Path::new("/a"), None).unwrap();
        {
            let mut f = OpenOptions::new().append(true).open(q.path()).unwrap();
            writeln!(f, "{{broken").unwrap();
            writeln!(f).unwrap();
        }
        q.enqueue("b", "p", Path::new("/b"), None).unwrap();

        assert_eq!(q.list_pending(None).len(), 2);

        q.mark_uploaded(Some(Path::new("/a"))).unwrap();
        let raw = fs::read_to_string(q.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{broken");
        assert!(lines[1].contains("\"content\":\"b\""));
    }

    #[test]
    fn test_remove_only_listed_ids() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        let cwd = Path::new("/a");
        let first = q.enqueue("first", "p", cwd, None).unwrap();
        let listed: Vec<MessageId> = q.list_pending(Some(cwd)).into_iter().map(|m| m.id).collect();
        q.enqueue("late", "p", cwd, None).unwrap();

        assert_eq!(q.remove(&listed).unwrap(), 1);
        let left = q.list_pending(Some(cwd));
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "late");
        assert_ne!(left[0].id, first.id);
    }

    #[test]
    fn test_remove_line_without_id() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        fs::write(
            q.path(),
            "{\"content\":\"legacy\",\"peerId\":\"p\",\"cwd\":\"/a\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"uploaded\":false}\n",
        )
        .unwrap();
        q.enqueue("new", "p", Path::new("/a"), None).unwrap();

        let first: Vec<MessageId> = q.list_pending(None).into_iter().map(|m| m.id).collect();
        let second: Vec<MessageId> = q.list_pending(None).into_iter().map(|m| m.id).collect();
        assert_eq!(first, second);

        assert_eq!(q.remove(&first[..1]).unwrap(), 1);
        let left = q.list_pending(None);
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].content, "new");
    }

    #[test]
    fn test_uploaded_entries_are_not_pending() {
        let temp = TempDir::new().unwrap();
        let q = queue(&temp);
        fs::write(
            q.path(),
            "{\"content\":\"x\",\"peerId\":\"p\",\"cwd\":\"/a\",\"timestamp\":\"2024-01-01T00:00:00Z\",\"uploaded\":true}\n",
        )
        .unwrap();
        assert!(q.list_pending(None).is_empty());
    }
}
