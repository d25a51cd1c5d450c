//! Cached context payloads and the forced-refresh counter.
//!
//! Two payloads are kept: what the service knows about the user, and what it
//! knows about the assistant peer. Each is fresh for `ttl_seconds` after it
//! was fetched. Independently of age, a refresh is forced once
//! `message_threshold` messages have been sent since the last refresh, so a
//! long, busy session still picks up newly derived knowledge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ResolvedConfig;
use crate::errors::MemsyncError;
use crate::payload::ContextPayload;
use crate::state_dir::StateDir;
use crate::store::DocumentStore;

/// Which peer a payload describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedContext {
    pub payload: ContextPayload,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextCacheDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<CachedContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assistant: Option<CachedContext>,
    #[serde(default)]
    message_count: u64,
    #[serde(default)]
    last_refresh_message_count: u64,
}

impl ContextCacheDocument {
    fn slot(&self, kind: ContextKind) -> Option<&CachedContext> {
        match kind {
            ContextKind::User => self.user.as_ref(),
            ContextKind::Assistant => self.assistant.as_ref(),
        }
    }

    fn slot_mut(&mut self, kind: ContextKind) -> &mut Option<CachedContext> {
        match kind {
            ContextKind::User => &mut self.user,
            ContextKind::Assistant => &mut self.assistant,
        }
    }

    fn refresh_due(&self, threshold: u64) -> bool {
        self.message_count.saturating_sub(self.last_refresh_message_count) >= threshold
    }
}

// ============================================================================
// ContextCache
// ============================================================================

#[derive(Debug, Clone)]
pub struct ContextCache {
    store: DocumentStore<ContextCacheDocument>,
    ttl_seconds: u64,
    message_threshold: u64,
}

impl ContextCache {
    pub fn new(state: &StateDir, ttl_seconds: u64, message_threshold: u64) -> Self {
        Self {
            store: DocumentStore::new(state.context_cache_path()),
            ttl_seconds,
            message_threshold,
        }
    }

    /// Use the policy values from `config`.
    pub fn from_config(state: &StateDir, config: &ResolvedConfig) -> Self {
        Self::new(
            state,
            config.context_ttl_seconds,
            config.message_refresh_threshold,
        )
    }

    /// The cached payload regardless of age.
    pub fn get(&self, kind: ContextKind) -> Option<ContextPayload> {
        self.store.load().slot(kind).map(|c| c.payload.clone())
    }

    /// The cached payload with its fetch time.
    pub fn entry(&self, kind: ContextKind) -> Option<CachedContext> {
        self.store.load().slot(kind).cloned()
    }

    pub fn set(&self, kind: ContextKind, payload: ContextPayload) -> Result<(), MemsyncError> {
        self.set_at(kind, payload, Utc::now())
    }

    pub fn set_at(
        &self,
        kind: ContextKind,
        payload: ContextPayload,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), MemsyncError> {
        self.store.update(|doc| {
            *doc.slot_mut(kind) = Some(CachedContext {
                payload,
                fetched_at,
            });
        })
    }

    /// Whether `kind` needs fetching. A missing entry is stale.
    pub fn is_stale(&self, kind: ContextKind) -> bool {
        self.is_stale_at(kind, Utc::now())
    }

    pub fn is_stale_at(&self, kind: ContextKind, now: DateTime<Utc>) -> bool {
        let doc = self.store.load();
        let Some(entry) = doc.slot(kind) else {
            return true;
        };
        let ttl_ms = i64::try_from(self.ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        now.signed_duration_since(entry.fetched_at).num_milliseconds() >= ttl_ms
    }

    /// The payload only when fresh and no forced refresh is due.
    pub fn get_fresh(&self, kind: ContextKind) -> Option<ContextPayload> {
        self.get_fresh_at(kind, Utc::now())
    }

    pub fn get_fresh_at(&self, kind: ContextKind, now: DateTime<Utc>) -> Option<ContextPayload> {
        if self.should_force_refresh() || self.is_stale_at(kind, now) {
            return None;
        }
        self.get(kind)
    }

    /// Count one outbound message and return the new total.
    pub fn increment_message_count(&self) -> Result<u64, MemsyncError> {
        self.store.update(|doc| {
            doc.message_count = doc.message_count.saturating_add(1);
            doc.message_count
        })
    }

    pub fn message_count(&self) -> u64 {
        self.store.load().message_count
    }

    /// Whether enough messages have been sent since the last refresh.
    pub fn should_force_refresh(&self) -> bool {
        let due = self.store.load().refresh_due(self.message_threshold);
        if due {
            tracing::debug!(
                "Forced context refresh due (threshold {})",
                self.message_threshold
            );
        }
        due
    }

    /// Record that a refresh happened at the current message count.
    pub fn mark_refreshed(&self) -> Result<(), MemsyncError> {
        self.store
            .update(|doc| doc.last_refresh_message_count = doc.message_count)
    }

    /// Start counting from zero; called once per new session.
    pub fn reset_message_count(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| {
            doc.message_count = 0;
            doc.last_refresh_message_count = 0;
        })
    }

    /// Drop both payloads. Counters are kept.
    pub fn clear(&self) -> Result<(), MemsyncError> {
        self.store.update(|doc| {
            doc.user = None;
            doc.assistant = None;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;

    fn cache(temp: &TempDir) -> ContextCache {
        ContextCache::new(&StateDir::at(temp.path()), 300, 3)
    }

    #[test]
    fn test_missing_entry_is_stale() {
        let temp = TempDir::new().unwrap();
        assert!(cache(&temp).is_stale(ContextKind::User));
    }

    #[test]
    fn test_fresh_until_ttl_elapses() {
        let temp = TempDir::new().unwrap();
        let c = cache(&temp);
        let t0 = Utc::now();
        c.set_at(ContextKind::User, ContextPayload::new(json!({"a": 1})), t0)
            .unwrap();

        assert!(!c.is_stale_at(ContextKind::User, t0));
        assert!(!c.is_stale_at(ContextKind::User, t0 + Duration::seconds(299)));
        assert!(c.is_stale_at(ContextKind::User, t0 + Duration::seconds(300)));
        // Kinds are independent.
        assert!(c.is_stale_at(ContextKind::Assistant, t0));
    }

    #[test]
    fn test_force_refresh_at_threshold() {
        let temp = TempDir::new().unwrap();
        let c = cache(&temp);
        assert!(!c.should_force_refresh());

        c.increment_message_count().unwrap();
        c.increment_message_count().unwrap();
        assert!(!c.should_force_refresh());
        assert_eq!(c.increment_message_count().unwrap(), 3);
        assert!(c.should_force_refresh());

        c.mark_refreshed().unwrap();
        assert!(!c.should_force_refresh());
        assert_eq!(c.message_count(), 3);
    }

    #[test]
    fn test_get_fresh_respects_forced_refresh() {
        let temp = TempDir::new().unwrap();
        let c = cache(&temp);
        let now = Utc::now();
        c.set_at(ContextKind::User, ContextPayload::new(json!({"x": 1})), now)
            .unwrap();
        assert!(c.get_fresh_at(ContextKind::User, now).is_some());

        for _ in 0..3 {
            c.increment_message_count().unwrap();
        }
        assert!(c.get_fresh_at(ContextKind::User, now).is_none());
        assert!(c.get(ContextKind::User).is_some());
    }

    #[test]
    fn test_reset_and_clear() {
        let temp = TempDir::new().unwrap();
        let c = cache(&temp);
        c.set(ContextKind::Assistant, ContextPayload::new(json!({})))
            .unwrap();
        c.increment_message_count().unwrap();

        c.clear().unwrap();
        assert!(c.get(ContextKind::Assistant).is_none());
        assert_eq!(c.message_count(), 1);

        c.reset_message_count().unwrap();
        assert_eq!(c.message_count(), 0);
    }
}
