//! Remote context payloads.
//!
//! The knowledge service returns loosely structured JSON describing what it
//! knows about a peer. memsync never validates that shape; it stores the
//! value verbatim and reads it through forgiving accessors that return
//! `None`/empty when a field is missing or has an unexpected type.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An opaque context payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextPayload(pub Value);

impl ContextPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// The raw JSON value.
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Free-text representation of the peer.
    pub fn representation(&self) -> Option<&str> {
        self.get_str("representation")
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Short facts about the peer (`peerCard` / `peer_card`).
    pub fn peer_card(&self) -> Vec<&str> {
        self.string_list(&["peerCard", "peer_card"])
    }

    /// Derived conclusions.
    ///
    /// Entries may be plain strings or objects carrying `content`.
    pub fn conclusions(&self) -> Vec<&str> {
        self.string_list(&["conclusions", "facts"])
    }

    /// Whether the payload carries nothing worth rendering.
    pub fn is_empty(&self) -> bool {
        self.representation().is_none() && self.peer_card().is_empty() && self.conclusions().is_empty()
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    fn string_list(&self, keys: &[&str]) -> Vec<&str> {
        let Some(items) = keys
            .iter()
            .find_map(|k| self.0.get(*k).and_then(|v| v.as_array()))
        else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.as_str()),
                Value::Object(_) => item.get("content").and_then(|c| c.as_str()),
                _ => None,
            })
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl From<Value> for ContextPayload {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
