//! The remote knowledge service, as seen by the hooks.
//!
//! memsync does not ship a client for the service. Callers implement
//! [`KnowledgeService`] over whatever transport they use; the hooks only rely
//! on the contract below.

use chrono::{DateTime, Utc};
use memsync_core::ContextPayload;
use serde::{Deserialize, Serialize};

use crate::errors::ServiceResult;

// ============================================================================
// Request types
// ============================================================================

/// Options for [`KnowledgeService::fetch_context`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Session the context is requested for, if already resolved.
    pub session_id: Option<String>,
    /// Text to focus retrieval on (usually the current prompt).
    pub search_query: Option<String>,
    /// Upper bound on the size of the returned context.
    pub max_chars: Option<usize>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_search_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }
}

/// A message as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    /// Remote peer id, or the peer name when the id is unknown.
    pub peer_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// KnowledgeService Trait
// ============================================================================

/// Trait for knowledge-service client implementations.
///
/// ## Sync Design
///
/// This trait is synchronous. Hooks run as one-shot processes with nothing
/// else to do while a call is in flight; async clients wrap their calls in a
/// runtime's `block_on()` internally. Timeouts and retries are the
/// implementor's concern.
pub trait KnowledgeService: Send + Sync {
    /// Resolve (or create) the workspace named `name`.
    fn resolve_workspace(&self, name: &str) -> ServiceResult<String>;

    /// Resolve (or create) the peer named `name`.
    fn resolve_peer(&self, name: &str) -> ServiceResult<String>;

    /// Resolve (or create) the session named `name`.
    fn resolve_session(&self, name: &str) -> ServiceResult<String>;

    /// Fetch what the service knows about `peer_id`.
    fn fetch_context(&self, peer_id: &str, options: &FetchOptions)
        -> ServiceResult<ContextPayload>;

    /// Deliver `messages` to `session_id`.
    ///
    /// `Ok` means every message was accepted.
    fn send_messages(&self, session_id: &str, messages: &[OutboundMessage]) -> ServiceResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_options_builder() {
        let options = FetchOptions::new()
            .with_session("s-1")
            .with_search_query("how do I test this")
            .with_max_chars(500);
        assert_eq!(options.session_id.as_deref(), Some("s-1"));
        assert_eq!(options.search_query.as_deref(), Some("how do I test this"));
        assert_eq!(options.max_chars, Some(500));
    }
}
