//! Explicit invocation context: the environment snapshot and detected host.
//!
//! Each hook invocation captures the handful of environment variables memsync
//! cares about exactly once, into an [`Environment`] value that is passed into
//! constructors. Nothing else in the crate reads `std::env`, so tests can run
//! many simulated invocations side by side without touching process state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{CAPTURED_ENV_VARS, ENV_CURSOR_MARKER, ENV_HOST};
use crate::errors::MemsyncError;

// ============================================================================
// Environment
// ============================================================================

/// A snapshot of the environment variables relevant to memsync.
///
/// Empty values are treated as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture the variables listed in [`CAPTURED_ENV_VARS`] from the process.
    pub fn from_process() -> Self {
        let vars = CAPTURED_ENV_VARS
            .iter()
            .filter_map(|name| {
                std::env::var(name)
                    .ok()
                    .map(|value| ((*name).to_string(), value))
            })
            .collect();
        Self { vars }
    }

    /// Build an environment from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// An environment with nothing set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Get a non-empty variable.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Get a boolean variable.
    ///
    /// Accepts `1/0`, `true/false`, `yes/no`, `on/off` (case-insensitive).
    /// Any other value is ignored with a warning.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        let raw = self.get(name)?;
        match parse_bool(raw) {
            Some(b) => Some(b),
            None => {
                tracing::warn!("Ignoring {}={:?}: not a boolean", name, raw);
                None
            }
        }
    }
}

/// Parse the boolean spellings accepted in env vars and `set_field` values.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ============================================================================
// HostKind
// ============================================================================

/// The integrated tool on whose behalf memsync runs.
///
/// Several hosts share one configuration file; each owns its own block of
/// host-specific fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// Claude Code.
    #[default]
    ClaudeCode,
    /// Cursor.
    Cursor,
}

impl HostKind {
    /// Detect the host from the environment.
    ///
    /// `MEMSYNC_HOST` wins when it names a known host; otherwise Cursor is
    /// recognised by its trace marker, and Claude Code is the fallback.
    pub fn detect(env: &Environment) -> Self {
        if let Some(forced) = env.get(ENV_HOST) {
            match forced.parse() {
                Ok(host) => return host,
                Err(e) => tracing::warn!("{}", e),
            }
        }
        if env.get(ENV_CURSOR_MARKER).is_some() {
            return Self::Cursor;
        }
        Self::ClaudeCode
    }

    /// Key of this host's block in the configuration file.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::Cursor => "cursor",
        }
    }

    /// Workspace name used when nothing is configured.
    pub fn default_workspace(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude_code",
            Self::Cursor => "cursor",
        }
    }

    /// AI peer name used when nothing is configured.
    pub fn default_ai_peer(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude",
            Self::Cursor => "cursor",
        }
    }
}

impl fmt::Display for HostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for HostKind {
    type Err = MemsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude_code" | "claude-code" | "claude" => Ok(Self::ClaudeCode),
            "cursor" => Ok(Self::Cursor),
            other => Err(MemsyncError::UnknownHost(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values_are_unset() {
        let env = Environment::from_pairs([("MEMSYNC_API_KEY", "  ")]);
        assert_eq!(env.get("MEMSYNC_API_KEY"), None);
    }

    #[test]
    fn test_get_bool_spellings() {
        let env = Environment::from_pairs([("A", "yes"), ("B", "OFF"), ("C", "maybe")]);
        assert_eq!(env.get_bool("A"), Some(true));
        assert_eq!(env.get_bool("B"), Some(false));
        assert_eq!(env.get_bool("C"), None);
        assert_eq!(env.get_bool("D"), None);
    }

    #[test]
    fn test_detect_defaults_to_claude_code() {
        assert_eq!(HostKind::detect(&Environment::empty()), HostKind::ClaudeCode);
    }

    #[test]
    fn test_detect_cursor_marker() {
        let env = Environment::from_pairs([(ENV_CURSOR_MARKER, "abc")]);
        assert_eq!(HostKind::detect(&env), HostKind::Cursor);
    }

    #[test]
    fn test_detect_forced_host_wins() {
        let env = Environment::from_pairs([(ENV_CURSOR_MARKER, "abc"), (ENV_HOST, "claude-code")]);
        assert_eq!(HostKind::detect(&env), HostKind::ClaudeCode);
    }

    #[test]
    fn test_detect_ignores_unknown_forced_host() {
        let env = Environment::from_pairs([(ENV_HOST, "emacs")]);
        assert_eq!(HostKind::detect(&env), HostKind::ClaudeCode);
    }

    #[test]
    fn test_host_key_roundtrip() {
        for host in [HostKind::ClaudeCode, HostKind::Cursor] {
            assert_eq!(host.key().parse::<HostKind>().unwrap(), host);
        }
    }
}
