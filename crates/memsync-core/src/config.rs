//! Configuration for memsync.
//!
//! One `config.json` is shared by every host (Claude Code, Cursor, ...). This
//! module provides:
//! - [`PersistedConfig`]: the on-disk record, with unknown keys preserved
//! - [`ResolvedConfig`]: the effective view for one host and environment
//! - [`ConfigStore`]: load, save, and field-level edits via read-merge-write
//!
//! # Resolution
//!
//! Shared fields resolve as environment > file > default. The host-scoped
//! fields (`workspace`, `aiPeer`) resolve as host block > environment > flat
//! field > host default; with `globalOverride` set, host blocks are bypassed
//! and the flat fields apply to every host.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{
    DEFAULT_CONTEXT_TTL_SECONDS, DEFAULT_ENDPOINT, DEFAULT_MAX_ACTIVITY_ENTRIES,
    DEFAULT_MAX_CONTEXT_CHARS, DEFAULT_MAX_MESSAGE_CHARS, DEFAULT_MESSAGE_REFRESH_THRESHOLD,
    DEFAULT_PEER_NAME, ENV_AI_PEER, ENV_API_KEY, ENV_ENABLED, ENV_ENDPOINT, ENV_LOGGING,
    ENV_PEER_NAME, ENV_USER, ENV_WORKSPACE,
};
use crate::context_cache::ContextCache;
use crate::environment::{parse_bool, Environment, HostKind};
use crate::errors::MemsyncError;
use crate::git_state::GitSnapshot;
use crate::identifiers::IdentifierCache;
use crate::state_dir::StateDir;
use crate::store::DocumentStore;
use crate::text::{base_name, path_key, sanitize_name};

// ============================================================================
// SessionStrategy
// ============================================================================

/// How the remote session for a working directory is named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionStrategy {
    /// `peer-repo`, or a manually assigned name.
    #[default]
    PerDirectory,
    /// `peer-repo-branch`.
    GitBranch,
    /// `chat-<instance id>`; one session per running host instance.
    ChatInstance,
}

impl fmt::Display for SessionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerDirectory => write!(f, "per-directory"),
            Self::GitBranch => write!(f, "git-branch"),
            Self::ChatInstance => write!(f, "chat-instance"),
        }
    }
}

impl FromStr for SessionStrategy {
    type Err = MemsyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "per-directory" | "directory" => Ok(Self::PerDirectory),
            "git-branch" | "branch" => Ok(Self::GitBranch),
            "chat-instance" | "instance" => Ok(Self::ChatInstance),
            _ => Err(MemsyncError::UnknownSessionStrategy(s.to_string())),
        }
    }
}

// ============================================================================
// PersistedConfig
// ============================================================================

/// Fields a host owns in its `hosts.<key>` block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_peer: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The configuration record exactly as stored in `config.json`.
///
/// Every field is optional so that absent keys fall through to defaults, and
/// keys this version does not know about survive a rewrite in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Flat workspace: legacy, or the value for every host under global override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_peer: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, HostBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_override: Option<bool>,

    /// Kept as text so an unknown strategy does not invalidate the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_peer_prefix: Option<bool>,
    /// Working directory -> manually assigned session name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sessions: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_messages: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_refresh_threshold: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_activity_entries: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_chars: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_chars: Option<usize>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// ConfigField
// ============================================================================

/// A user-settable configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigField {
    ApiKey,
    PeerName,
    Endpoint,
    Workspace,
    AiPeer,
    GlobalOverride,
    SessionStrategy,
    SessionPeerPrefix,
    SaveMessages,
    Logging,
    Enabled,
    ContextTtlSeconds,
    MessageRefreshThreshold,
    MaxActivityEntries,
    MaxMessageChars,
    MaxContextChars,
}

impl ConfigField {
    pub const ALL: [ConfigField; 16] = [
        Self::ApiKey,
        Self::PeerName,
        Self::Endpoint,
        Self::Workspace,
        Self::AiPeer,
        Self::GlobalOverride,
        Self::SessionStrategy,
        Self::SessionPeerPrefix,
        Self::SaveMessages,
        Self::Logging,
        Self::Enabled,
        Self::ContextTtlSeconds,
        Self::MessageRefreshThreshold,
        Self::MaxActivityEntries,
        Self::MaxMessageChars,
        Self::MaxContextChars,
    ];

    /// Key in `config.json`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ApiKey => "apiKey",
            Self::PeerName => "peerName",
            Self::Endpoint => "endpoint",
            Self::Workspace => "workspace",
            Self::AiPeer => "aiPeer",
            Self::GlobalOverride => "globalOverride",
            Self::SessionStrategy => "sessionStrategy",
            Self::SessionPeerPrefix => "sessionPeerPrefix",
            Self::SaveMessages => "saveMessages",
            Self::Logging => "logging",
            Self::Enabled => "enabled",
            Self::ContextTtlSeconds => "contextTtlSeconds",
            Self::MessageRefreshThreshold => "messageRefreshThreshold",
            Self::MaxActivityEntries => "maxActivityEntries",
            Self::MaxMessageChars => "maxMessageChars",
            Self::MaxContextChars => "maxContextChars",
        }
    }

    /// Environment variable that overrides this field, if any.
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::ApiKey => Some(ENV_API_KEY),
            Self::PeerName => Some(ENV_PEER_NAME),
            Self::Endpoint => Some(ENV_ENDPOINT),
            Self::Workspace => Some(ENV_WORKSPACE),
            Self::AiPeer => Some(ENV_AI_PEER),
            Self::Logging => Some(ENV_LOGGING),
            Self::Enabled => Some(ENV_ENABLED),
            _ => None,
        }
    }

    /// Changing this field re-points memsync at different remote data.
    pub fn is_dangerous(&self) -> bool {
        matches!(self, Self::Workspace | Self::Endpoint)
    }

    /// Changing this field invalidates cached ids and context.
    pub fn is_identity(&self) -> bool {
        matches!(
            self,
            Self::PeerName | Self::AiPeer | Self::Workspace | Self::Endpoint
        )
    }

    /// Changing this field changes how default session names are derived.
    pub fn clears_manual_sessions(&self) -> bool {
        matches!(
            self,
            Self::SessionStrategy | Self::PeerName | Self::SessionPeerPrefix
        )
    }

    /// Stored per host unless global override is on.
    pub fn is_host_scoped(&self) -> bool {
        matches!(self, Self::Workspace | Self::AiPeer)
    }
}

impl fmt::Display for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl FromStr for ConfigField {
    type Err = MemsyncError;

    /// Accepts `camelCase`, `snake_case`, and `kebab-case` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|field| field.key().to_lowercase() == wanted)
            .ok_or_else(|| MemsyncError::UnknownConfigField(s.to_string()))
    }
}

// ============================================================================
// ConfigUpdate
// ============================================================================

/// A parsed value for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigUpdate {
    ApiKey(String),
    PeerName(String),
    Endpoint(String),
    Workspace(String),
    AiPeer(String),
    GlobalOverride(bool),
    SessionStrategy(SessionStrategy),
    SessionPeerPrefix(bool),
    SaveMessages(bool),
    Logging(bool),
    Enabled(bool),
    ContextTtlSeconds(u64),
    MessageRefreshThreshold(u64),
    MaxActivityEntries(usize),
    MaxMessageChars(usize),
    MaxContextChars(usize),
}

impl ConfigUpdate {
    /// Parse `raw` according to the type of `field`.
    ///
    /// # Errors
    ///
    /// Returns [`MemsyncError::InvalidConfigValue`] when `raw` does not fit.
    pub fn parse(field: ConfigField, raw: &str) -> Result<Self, MemsyncError> {
        let invalid = |reason: &str| MemsyncError::InvalidConfigValue {
            field: field.key().to_string(),
            value: raw.to_string(),
            reason: reason.to_string(),
        };
        let text = || {
            let t = raw.trim();
            if t.is_empty() {
                Err(invalid("must not be empty"))
            } else {
                Ok(t.to_string())
            }
        };
        let flag = || parse_bool(raw).ok_or_else(|| invalid("expected true or false"));
        let number = || {
            raw.trim()
                .parse::<u64>()
                .map_err(|_| invalid("expected a non-negative integer"))
        };
        let size = || {
            raw.trim()
                .parse::<usize>()
                .map_err(|_| invalid("expected a non-negative integer"))
        };

        Ok(match field {
            ConfigField::ApiKey => Self::ApiKey(text()?),
            ConfigField::PeerName => Self::PeerName(text()?),
            ConfigField::Endpoint => {
                let url = text()?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(invalid("expected an http:// or https:// URL"));
                }
                Self::Endpoint(url.trim_end_matches('/').to_string())
            }
            ConfigField::Workspace => Self::Workspace(text()?),
            ConfigField::AiPeer => Self::AiPeer(text()?),
            ConfigField::GlobalOverride => Self::GlobalOverride(flag()?),
            ConfigField::SessionStrategy => Self::SessionStrategy(
                raw.parse()
                    .map_err(|_| invalid("expected per-directory, git-branch or chat-instance"))?,
            ),
            ConfigField::SessionPeerPrefix => Self::SessionPeerPrefix(flag()?),
            ConfigField::SaveMessages => Self::SaveMessages(flag()?),
            ConfigField::Logging => Self::Logging(flag()?),
            ConfigField::Enabled => Self::Enabled(flag()?),
            ConfigField::ContextTtlSeconds => Self::ContextTtlSeconds(number()?),
            ConfigField::MessageRefreshThreshold => Self::MessageRefreshThreshold(number()?),
            ConfigField::MaxActivityEntries => Self::MaxActivityEntries(size()?),
            ConfigField::MaxMessageChars => Self::MaxMessageChars(size()?),
            ConfigField::MaxContextChars => Self::MaxContextChars(size()?),
        })
    }

    pub fn field(&self) -> ConfigField {
        match self {
            Self::ApiKey(_) => ConfigField::ApiKey,
            Self::PeerName(_) => ConfigField::PeerName,
            Self::Endpoint(_) => ConfigField::Endpoint,
            Self::Workspace(_) => ConfigField::Workspace,
            Self::AiPeer(_) => ConfigField::AiPeer,
            Self::GlobalOverride(_) => ConfigField::GlobalOverride,
            Self::SessionStrategy(_) => ConfigField::SessionStrategy,
            Self::SessionPeerPrefix(_) => ConfigField::SessionPeerPrefix,
            Self::SaveMessages(_) => ConfigField::SaveMessages,
            Self::Logging(_) => ConfigField::Logging,
            Self::Enabled(_) => ConfigField::Enabled,
            Self::ContextTtlSeconds(_) => ConfigField::ContextTtlSeconds,
            Self::MessageRefreshThreshold(_) => ConfigField::MessageRefreshThreshold,
            Self::MaxActivityEntries(_) => ConfigField::MaxActivityEntries,
            Self::MaxMessageChars(_) => ConfigField::MaxMessageChars,
            Self::MaxContextChars(_) => ConfigField::MaxContextChars,
        }
    }

    /// Write the value into `doc` at the scope its field lives in.
    fn apply(&self, doc: &mut PersistedConfig, host: HostKind) {
        let global = doc.global_override.unwrap_or(false);
        match self {
            Self::ApiKey(v) => doc.api_key = Some(v.clone()),
            Self::PeerName(v) => doc.peer_name = Some(v.clone()),
            Self::Endpoint(v) => doc.endpoint = Some(v.clone()),
            Self::Workspace(v) if global => doc.workspace = Some(v.clone()),
            Self::Workspace(v) => host_block(doc, host).workspace = Some(v.clone()),
            Self::AiPeer(v) if global => doc.ai_peer = Some(v.clone()),
            Self::AiPeer(v) => host_block(doc, host).ai_peer = Some(v.clone()),
            Self::GlobalOverride(v) => doc.global_override = Some(*v),
            Self::SessionStrategy(v) => doc.session_strategy = Some(v.to_string()),
            Self::SessionPeerPrefix(v) => doc.session_peer_prefix = Some(*v),
            Self::SaveMessages(v) => doc.save_messages = Some(*v),
            Self::Logging(v) => doc.logging = Some(*v),
            Self::Enabled(v) => doc.enabled = Some(*v),
            Self::ContextTtlSeconds(v) => doc.context_ttl_seconds = Some(*v),
            Self::MessageRefreshThreshold(v) => doc.message_refresh_threshold = Some(*v),
            Self::MaxActivityEntries(v) => doc.max_activity_entries = Some(*v),
            Self::MaxMessageChars(v) => doc.max_message_chars = Some(*v),
            Self::MaxContextChars(v) => doc.max_context_chars = Some(*v),
        }
    }
}

fn host_block(doc: &mut PersistedConfig, host: HostKind) -> &mut HostBlock {
    doc.hosts.entry(host.key().to_string()).or_default()
}

// ============================================================================
// Outcomes and warnings
// ============================================================================

/// A non-fatal condition reported by [`ConfigStore::set_field`] or
/// [`ResolvedConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// The field needs explicit confirmation; nothing was changed.
    ConfirmationRequired { field: ConfigField },
    /// The saved value is shadowed by an environment variable.
    OverriddenByEnvironment {
        field: ConfigField,
        variable: &'static str,
    },
    /// Manual session names were dropped because naming inputs changed.
    ManualSessionsCleared { count: usize },
    /// A policy value that is allowed but probably unintended.
    Suspicious { field: ConfigField, message: String },
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfirmationRequired { field } => write!(
                f,
                "Changing `{}` points memsync at different remote data; confirm to apply",
                field
            ),
            Self::OverriddenByEnvironment { field, variable } => write!(
                f,
                "`{}` is overridden by {}; the saved value applies once it is unset",
                field, variable
            ),
            Self::ManualSessionsCleared { count } => {
                write!(f, "Cleared {} manual session name(s)", count)
            }
            Self::Suspicious { field, message } => write!(f, "`{}`: {}", field, message),
        }
    }
}

/// A cache that was emptied as a side effect of a config change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Identifiers,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInvalidation {
    pub cache: CacheKind,
    pub reason: String,
}

/// Result of [`ConfigStore::set_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFieldOutcome {
    pub field: ConfigField,
    /// Effective value before the change (API keys masked).
    pub previous: Option<String>,
    pub applied: bool,
    pub warnings: Vec<ConfigWarning>,
    pub invalidated: Vec<CacheInvalidation>,
}

// ============================================================================
// ResolvedConfig
// ============================================================================

/// The effective configuration for one host under one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub host: HostKind,
    /// Empty when unconfigured.
    pub api_key: String,
    pub peer_name: String,
    pub endpoint: String,
    pub workspace: String,
    pub ai_peer: String,
    pub global_override: bool,
    pub session_strategy: SessionStrategy,
    pub session_peer_prefix: bool,
    pub sessions: BTreeMap<String, String>,
    pub save_messages: bool,
    pub logging: bool,
    pub enabled: bool,
    pub context_ttl_seconds: u64,
    pub message_refresh_threshold: u64,
    pub max_activity_entries: usize,
    pub max_message_chars: usize,
    pub max_context_chars: usize,
    env_sourced: BTreeSet<ConfigField>,
}

impl ResolvedConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Whether `field` took its value from the environment.
    pub fn is_env_sourced(&self, field: ConfigField) -> bool {
        self.env_sourced.contains(&field)
    }

    /// Effective value of `field` as text, with the API key masked.
    pub fn display_value(&self, field: ConfigField) -> Option<String> {
        let value = match field {
            ConfigField::ApiKey => {
                if self.api_key.is_empty() {
                    return None;
                }
                mask_secret(&self.api_key)
            }
            ConfigField::PeerName => self.peer_name.clone(),
            ConfigField::Endpoint => self.endpoint.clone(),
            ConfigField::Workspace => self.workspace.clone(),
            ConfigField::AiPeer => self.ai_peer.clone(),
            ConfigField::GlobalOverride => self.global_override.to_string(),
            ConfigField::SessionStrategy => self.session_strategy.to_string(),
            ConfigField::SessionPeerPrefix => self.session_peer_prefix.to_string(),
            ConfigField::SaveMessages => self.save_messages.to_string(),
            ConfigField::Logging => self.logging.to_string(),
            ConfigField::Enabled => self.enabled.to_string(),
            ConfigField::ContextTtlSeconds => self.context_ttl_seconds.to_string(),
            ConfigField::MessageRefreshThreshold => self.message_refresh_threshold.to_string(),
            ConfigField::MaxActivityEntries => self.max_activity_entries.to_string(),
            ConfigField::MaxMessageChars => self.max_message_chars.to_string(),
            ConfigField::MaxContextChars => self.max_context_chars.to_string(),
        };
        Some(value)
    }

    /// Identity fields whose effective value differs between `self` and
    /// `other`. Any such difference points memsync at other remote data.
    pub fn identity_changes(&self, other: &ResolvedConfig) -> Vec<ConfigField> {
        ConfigField::ALL
            .into_iter()
            .filter(|f| f.is_identity())
            .filter(|f| self.display_value(*f) != other.display_value(*f))
            .collect()
    }

    /// Name of the remote session for `cwd`.
    ///
    /// Strategies that lack their input (no git snapshot for `git-branch`, no
    /// instance id for `chat-instance`) fall back to the per-directory name.
    pub fn resolve_session_name(
        &self,
        cwd: &Path,
        git: Option<&GitSnapshot>,
        instance_id: Option<&str>,
    ) -> String {
        match self.session_strategy {
            SessionStrategy::PerDirectory => self.directory_session_name(cwd),
            SessionStrategy::GitBranch => {
                let branch = git.map(|s| sanitize_name(&s.branch)).unwrap_or_default();
                if branch.is_empty() {
                    tracing::debug!("No git branch for {}; using directory session", cwd.display());
                    return self.directory_session_name(cwd);
                }
                format!("{}-{}", self.base_session_name(cwd), branch)
            }
            SessionStrategy::ChatInstance => {
                let id = instance_id.map(sanitize_name).unwrap_or_default();
                if id.is_empty() {
                    tracing::debug!("No instance id; using directory session");
                    return self.directory_session_name(cwd);
                }
                format!("chat-{}", id)
            }
        }
    }

    fn directory_session_name(&self, cwd: &Path) -> String {
        match self.sessions.get(&path_key(cwd)) {
            Some(manual) => manual.clone(),
            None => self.base_session_name(cwd),
        }
    }

    fn base_session_name(&self, cwd: &Path) -> String {
        let mut parts = Vec::with_capacity(2);
        if self.session_peer_prefix {
            parts.push(sanitize_name(&self.peer_name));
        }
        parts.push(sanitize_name(&base_name(cwd)));
        let name = parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if name.is_empty() {
            "default".to_string()
        } else {
            name
        }
    }

    /// Policy values that are allowed but probably unintended.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut suspicious = |field, message: &str| {
            warnings.push(ConfigWarning::Suspicious {
                field,
                message: message.to_string(),
            })
        };
        if self.context_ttl_seconds == 0 {
            suspicious(
                ConfigField::ContextTtlSeconds,
                "0 disables caching; context is fetched on every event",
            );
        }
        if self.message_refresh_threshold == 0 {
            suspicious(
                ConfigField::MessageRefreshThreshold,
                "0 forces a context refresh on every message",
            );
        }
        if self.max_message_chars == 0 {
            suspicious(
                ConfigField::MaxMessageChars,
                "0 uploads only empty messages",
            );
        }
        if self.max_context_chars == 0 {
            suspicious(ConfigField::MaxContextChars, "0 suppresses injected context");
        }
        if self.max_activity_entries == 0 {
            suspicious(ConfigField::MaxActivityEntries, "0 disables the activity log");
        }
        warnings
    }
}

fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{}", tail)
}

// ============================================================================
// ConfigStore
// ============================================================================

/// Access to `config.json` for one host under one environment.
///
/// # Example
///
/// ```ignore
/// use memsync_core::{ConfigStore, Environment, StateDir};
///
/// let env = Environment::from_process();
/// let state = StateDir::resolve(None, &env)?;
/// let Some(config) = ConfigStore::new(&state, env).load() else {
///     return Ok(()); // unconfigured
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ConfigStore {
    state: StateDir,
    env: Environment,
    host: HostKind,
    store: DocumentStore<PersistedConfig>,
}

impl ConfigStore {
    /// Create a store for the host detected from `env`.
    pub fn new(state: &StateDir, env: Environment) -> Self {
        let host = HostKind::detect(&env);
        Self {
            state: state.clone(),
            store: DocumentStore::new(state.config_path()),
            env,
            host,
        }
    }

    /// Resolve for `host` instead of the detected one.
    pub fn with_host(mut self, host: HostKind) -> Self {
        self.host = host;
        self
    }

    pub fn host(&self) -> HostKind {
        self.host
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// The raw on-disk record.
    pub fn persisted(&self) -> PersistedConfig {
        self.store.load()
    }

    /// The resolved view, or `None` when no API key is available.
    pub fn load(&self) -> Option<ResolvedConfig> {
        let config = self.resolve();
        if !config.is_configured() {
            tracing::debug!("memsync is not configured (no API key)");
            return None;
        }
        Some(config)
    }

    /// The resolved view even when unconfigured.
    pub fn resolve(&self) -> ResolvedConfig {
        resolve(&self.store.load(), self.host, &self.env)
    }

    /// Merge `config` into the file.
    ///
    /// Shared fields are always written; host-scoped fields go to the
    /// config's host block, or to the flat fields under global override.
    /// Values that came from the environment are never persisted.
    pub fn save(&self, config: &ResolvedConfig) -> Result<(), MemsyncError> {
        let keep = |field| !config.is_env_sourced(field);
        self.store.update(|doc| {
            if keep(ConfigField::ApiKey) && config.is_configured() {
                doc.api_key = Some(config.api_key.clone());
            }
            if keep(ConfigField::PeerName) {
                doc.peer_name = Some(config.peer_name.clone());
            }
            if keep(ConfigField::Endpoint) {
                doc.endpoint = Some(config.endpoint.clone());
            }
            doc.global_override = Some(config.global_override);
            doc.session_strategy = Some(config.session_strategy.to_string());
            doc.session_peer_prefix = Some(config.session_peer_prefix);
            doc.sessions = config.sessions.clone();
            doc.save_messages = Some(config.save_messages);
            if keep(ConfigField::Logging) {
                doc.logging = Some(config.logging);
            }
            if keep(ConfigField::Enabled) {
                doc.enabled = Some(config.enabled);
            }
            doc.context_ttl_seconds = Some(config.context_ttl_seconds);
            doc.message_refresh_threshold = Some(config.message_refresh_threshold);
            doc.max_activity_entries = Some(config.max_activity_entries);
            doc.max_message_chars = Some(config.max_message_chars);
            doc.max_context_chars = Some(config.max_context_chars);

            let workspace = keep(ConfigField::Workspace).then(|| config.workspace.clone());
            let ai_peer = keep(ConfigField::AiPeer).then(|| config.ai_peer.clone());
            if config.global_override {
                if workspace.is_some() {
                    doc.workspace = workspace;
                }
                if ai_peer.is_some() {
                    doc.ai_peer = ai_peer;
                }
            } else if workspace.is_some() || ai_peer.is_some() {
                let block = host_block(doc, config.host);
                if workspace.is_some() {
                    block.workspace = workspace;
                }
                if ai_peer.is_some() {
                    block.ai_peer = ai_peer;
                }
            }
        })
    }

    /// Session name for `cwd` under the current configuration.
    pub fn resolve_session_name(
        &self,
        cwd: &Path,
        git: Option<&GitSnapshot>,
        instance_id: Option<&str>,
    ) -> String {
        self.resolve().resolve_session_name(cwd, git, instance_id)
    }

    /// Parse `raw` for `field` and apply it.
    ///
    /// Dangerous fields are left untouched unless `confirmed`; the outcome
    /// then carries a [`ConfigWarning::ConfirmationRequired`].
    pub fn set_field(
        &self,
        field: ConfigField,
        raw: &str,
        confirmed: bool,
    ) -> Result<SetFieldOutcome, MemsyncError> {
        let update = ConfigUpdate::parse(field, raw)?;
        self.apply(update, confirmed)
    }

    /// Apply an already parsed update.
    pub fn apply(
        &self,
        update: ConfigUpdate,
        confirmed: bool,
    ) -> Result<SetFieldOutcome, MemsyncError> {
        let field = update.field();
        let before = self.resolve();
        let previous = before.display_value(field);
        let mut warnings = Vec::new();

        if field.is_dangerous() && !confirmed {
            warnings.push(ConfigWarning::ConfirmationRequired { field });
            return Ok(SetFieldOutcome {
                field,
                previous,
                applied: false,
                warnings,
                invalidated: Vec::new(),
            });
        }

        let host = self.host;
        // Manual names follow the stored values, whether or not the
        // environment currently shadows them.
        let bare = Environment::empty();
        let cleared = self.store.update(|doc| {
            let old = resolve(doc, host, &bare);
            update.apply(doc, host);
            let new = resolve(doc, host, &bare);
            if field.clears_manual_sessions() && old.display_value(field) != new.display_value(field) {
                let count = doc.sessions.len();
                doc.sessions.clear();
                count
            } else {
                0
            }
        })?;
        if cleared > 0 {
            warnings.push(ConfigWarning::ManualSessionsCleared { count: cleared });
        }

        let after = self.resolve();
        if after.is_env_sourced(field) {
            if let Some(variable) = field.env_var() {
                warnings.push(ConfigWarning::OverriddenByEnvironment { field, variable });
            }
        }

        let mut invalidated = Vec::new();
        let changed = before.identity_changes(&after);
        if !changed.is_empty() {
            let names: Vec<&str> = changed.iter().map(ConfigField::key).collect();
            let reason = format!("{} changed", names.join(", "));
            IdentifierCache::new(&self.state).clear()?;
            invalidated.push(CacheInvalidation {
                cache: CacheKind::Identifiers,
                reason: reason.clone(),
            });
            ContextCache::from_config(&self.state, &after).clear()?;
            invalidated.push(CacheInvalidation {
                cache: CacheKind::Context,
                reason,
            });
            tracing::debug!("Invalidated identifier and context caches after setting {}", field);
        }

        Ok(SetFieldOutcome {
            field,
            previous,
            applied: true,
            warnings,
            invalidated,
        })
    }

    /// Pin the session name for `cwd`. Returns the name it replaces.
    ///
    /// Manual names apply under the per-directory strategy.
    pub fn set_manual_session_name(
        &self,
        cwd: &Path,
        name: &str,
    ) -> Result<Option<String>, MemsyncError> {
        let clean = sanitize_name(name);
        if clean.is_empty() {
            return Err(MemsyncError::InvalidConfigValue {
                field: "sessions".to_string(),
                value: name.to_string(),
                reason: "session name has no usable characters".to_string(),
            });
        }
        self.store
            .update(|doc| doc.sessions.insert(path_key(cwd), clean))
    }

    /// Remove the pinned session name for `cwd`. Returns the removed name.
    pub fn clear_manual_session_name(&self, cwd: &Path) -> Result<Option<String>, MemsyncError> {
        self.store.update(|doc| doc.sessions.remove(&path_key(cwd)))
    }

    /// Warnings for the current resolved view.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        self.resolve().validate()
    }
}

// ============================================================================
// Resolution
// ============================================================================

fn resolve(doc: &PersistedConfig, host: HostKind, env: &Environment) -> ResolvedConfig {
    let mut env_sourced = BTreeSet::new();

    let mut env_text = |field: ConfigField| -> Option<String> {
        let value = env.get(field.env_var()?)?.to_string();
        env_sourced.insert(field);
        Some(value)
    };
    let file_text = |v: &Option<String>| v.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string);

    let api_key = env_text(ConfigField::ApiKey)
        .or_else(|| file_text(&doc.api_key))
        .unwrap_or_default();
    let peer_name = env_text(ConfigField::PeerName)
        .or_else(|| file_text(&doc.peer_name))
        .or_else(|| env.get(ENV_USER).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_PEER_NAME.to_string());
    let endpoint = env_text(ConfigField::Endpoint)
        .or_else(|| file_text(&doc.endpoint))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    let global_override = doc.global_override.unwrap_or(false);
    let block = if global_override {
        None
    } else {
        doc.hosts.get(host.key())
    };
    let workspace = match block.and_then(|b| file_text(&b.workspace)) {
        Some(w) => w,
        None => env_text(ConfigField::Workspace)
            .or_else(|| file_text(&doc.workspace))
            .unwrap_or_else(|| host.default_workspace().to_string()),
    };
    let ai_peer = match block.and_then(|b| file_text(&b.ai_peer)) {
        Some(p) => p,
        None => env_text(ConfigField::AiPeer)
            .or_else(|| file_text(&doc.ai_peer))
            .unwrap_or_else(|| host.default_ai_peer().to_string()),
    };

    let mut env_flag = |field: ConfigField| -> Option<bool> {
        let value = env.get_bool(field.env_var()?)?;
        env_sourced.insert(field);
        Some(value)
    };
    let logging = env_flag(ConfigField::Logging)
        .or(doc.logging)
        .unwrap_or(false);
    let enabled = env_flag(ConfigField::Enabled)
        .or(doc.enabled)
        .unwrap_or(true);

    let session_strategy = match doc.session_strategy.as_deref() {
        None => SessionStrategy::default(),
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            tracing::warn!("{}; using per-directory", e);
            SessionStrategy::default()
        }),
    };

    ResolvedConfig {
        host,
        api_key,
        peer_name,
        endpoint,
        workspace,
        ai_peer,
        global_override,
        session_strategy,
        session_peer_prefix: doc.session_peer_prefix.unwrap_or(true),
        sessions: doc.sessions.clone(),
        save_messages: doc.save_messages.unwrap_or(true),
        logging,
        enabled,
        context_ttl_seconds: doc
            .context_ttl_seconds
            .unwrap_or(DEFAULT_CONTEXT_TTL_SECONDS),
        message_refresh_threshold: doc
            .message_refresh_threshold
            .unwrap_or(DEFAULT_MESSAGE_REFRESH_THRESHOLD),
        max_activity_entries: doc
            .max_activity_entries
            .unwrap_or(DEFAULT_MAX_ACTIVITY_ENTRIES),
        max_message_chars: doc.max_message_chars.unwrap_or(DEFAULT_MAX_MESSAGE_CHARS),
        max_context_chars: doc.max_context_chars.unwrap_or(DEFAULT_MAX_CONTEXT_CHARS),
        env_sourced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ENV_CURSOR_MARKER;
    use crate::context_cache::ContextKind;
    use crate::identifiers::IdKind;
    use crate::payload::ContextPayload;
    use std::fs;
    use tempfile::TempDir;

    fn store(temp: &TempDir, pairs: &[(&str, &str)]) -> ConfigStore {
        ConfigStore::new(
            &StateDir::at(temp.path()),
            Environment::from_pairs(pairs.iter().copied()),
        )
    }

    fn write_config(temp: &TempDir, json: &str) {
        fs::write(temp.path().join("config.json"), json).unwrap();
    }

    #[test]
    fn test_unconfigured_without_api_key() {
        let temp = TempDir::new().unwrap();
        assert!(store(&temp, &[]).load().is_none());
    }

    #[test]
    fn test_api_key_from_env_only() {
        let temp = TempDir::new().unwrap();
        let config = store(&temp, &[(ENV_API_KEY, "k"), (ENV_USER, "Alice")])
            .load()
            .unwrap();
        assert_eq!(config.api_key, "k");
        assert_eq!(config.peer_name, "Alice");
        assert_eq!(config.workspace, "claude_code");
        assert_eq!(config.ai_peer, "claude");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.is_env_sourced(ConfigField::ApiKey));
    }

    #[test]
    fn test_cursor_defaults() {
        let temp = TempDir::new().unwrap();
        let config = store(&temp, &[(ENV_API_KEY, "k"), (ENV_CURSOR_MARKER, "t")])
            .load()
            .unwrap();
        assert_eq!(config.host, HostKind::Cursor);
        assert_eq!(config.workspace, "cursor");
        assert_eq!(config.ai_peer, "cursor");
    }

    #[test]
    fn test_host_block_beats_env_and_flat() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","workspace":"flat","hosts":{"claude_code":{"workspace":"block"}}}"#,
        );
        let config = store(&temp, &[(ENV_WORKSPACE, "env")]).load().unwrap();
        assert_eq!(config.workspace, "block");
        assert!(!config.is_env_sourced(ConfigField::Workspace));

        // Another host has no block, so env wins there.
        let cursor = store(&temp, &[(ENV_WORKSPACE, "env")])
            .with_host(HostKind::Cursor)
            .load()
            .unwrap();
        assert_eq!(cursor.workspace, "env");
    }

    #[test]
    fn test_flat_field_applies_without_block() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","aiPeer":"legacy"}"#);
        assert_eq!(store(&temp, &[]).load().unwrap().ai_peer, "legacy");
    }

    #[test]
    fn test_global_override_bypasses_blocks() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","globalOverride":true,"workspace":"shared",
                "hosts":{"cursor":{"workspace":"mine"}}}"#,
        );
        let cursor = store(&temp, &[]).with_host(HostKind::Cursor).load().unwrap();
        assert_eq!(cursor.workspace, "shared");
    }

    #[test]
    fn test_env_booleans() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","enabled":true}"#);
        let config = store(&temp, &[(ENV_ENABLED, "0"), (ENV_LOGGING, "bogus")])
            .load()
            .unwrap();
        assert!(!config.enabled);
        assert!(!config.logging);
        assert!(config.is_env_sourced(ConfigField::Enabled));
        assert!(!config.is_env_sourced(ConfigField::Logging));
    }

    #[test]
    fn test_corrupt_file_is_unconfigured() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, "{{{");
        assert!(store(&temp, &[]).load().is_none());
    }

    #[test]
    fn test_unknown_strategy_falls_back() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","sessionStrategy":"weekly"}"#);
        let config = store(&temp, &[]).load().unwrap();
        assert_eq!(config.session_strategy, SessionStrategy::PerDirectory);
    }

    #[test]
    fn test_save_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let s = store(&temp, &[(ENV_USER, "alice")]);
        s.set_field(ConfigField::ApiKey, "secret-key", false).unwrap();
        let mut config = s.load().unwrap();
        config.ai_peer = "helper".to_string();
        config.session_strategy = SessionStrategy::GitBranch;
        config.context_ttl_seconds = 60;

        s.save(&config).unwrap();
        assert_eq!(s.load().unwrap(), config);
    }

    #[test]
    fn test_save_keeps_env_values_out_of_file() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"file-key","peerName":"file-peer"}"#);
        let s = store(&temp, &[(ENV_PEER_NAME, "env-peer")]);
        let config = s.load().unwrap();
        assert_eq!(config.peer_name, "env-peer");

        s.save(&config).unwrap();
        assert_eq!(s.persisted().peer_name.as_deref(), Some("file-peer"));
        assert_eq!(s.load().unwrap(), config);
    }

    #[test]
    fn test_two_hosts_keep_their_blocks() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);

        let cursor = store(&temp, &[]).with_host(HostKind::Cursor);
        let mut c = cursor.load().unwrap();
        c.workspace = "cursor-ws".to_string();
        cursor.save(&c).unwrap();

        let claude = store(&temp, &[]).with_host(HostKind::ClaudeCode);
        let mut cc = claude.load().unwrap();
        cc.workspace = "claude-ws".to_string();
        claude.save(&cc).unwrap();

        let doc = claude.persisted();
        assert_eq!(doc.hosts["cursor"].workspace.as_deref(), Some("cursor-ws"));
        assert_eq!(doc.hosts["claude_code"].workspace.as_deref(), Some("claude-ws"));
        assert_eq!(doc.workspace, None);
        assert_eq!(cursor.load().unwrap().workspace, "cursor-ws");
    }

    #[test]
    fn test_unknown_keys_preserved() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","futureFlag":{"x":1},"hosts":{"cursor":{"theme":"dark"}}}"#,
        );
        let s = store(&temp, &[]).with_host(HostKind::Cursor);
        s.set_field(ConfigField::AiPeer, "bot", false).unwrap();

        let raw: Value =
            serde_json::from_str(&fs::read_to_string(temp.path().join("config.json")).unwrap())
                .unwrap();
        assert_eq!(raw["futureFlag"]["x"], 1);
        assert_eq!(raw["hosts"]["cursor"]["theme"], "dark");
        assert_eq!(raw["hosts"]["cursor"]["aiPeer"], "bot");
    }

    #[test]
    fn test_session_names_per_strategy() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","peerName":"alice"}"#);
        let s = store(&temp, &[]);
        let cwd = Path::new("/home/alice/repo");

        assert_eq!(s.resolve_session_name(cwd, None, None), "alice-repo");

        s.set_field(ConfigField::SessionStrategy, "git-branch", false)
            .unwrap();
        let dev = GitSnapshot::new("dev", "abc", "msg");
        let main = GitSnapshot::new("main", "abc", "msg");
        assert_eq!(s.resolve_session_name(cwd, Some(&dev), None), "alice-repo-dev");
        assert_eq!(s.resolve_session_name(cwd, Some(&main), None), "alice-repo-main");
        assert_eq!(s.resolve_session_name(cwd, None, None), "alice-repo");

        s.set_field(ConfigField::SessionStrategy, "chat-instance", false)
            .unwrap();
        assert_eq!(s.resolve_session_name(cwd, None, Some("AB12")), "chat-ab12");
        assert_eq!(s.resolve_session_name(cwd, None, None), "alice-repo");
    }

    #[test]
    fn test_session_name_sanitized_and_prefix_toggle() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","peerName":"Alice Smith","sessionPeerPrefix":false}"#,
        );
        let s = store(&temp, &[]);
        assert_eq!(
            s.resolve_session_name(Path::new("/w/My.Project"), None, None),
            "my-project"
        );
        s.set_field(ConfigField::SessionPeerPrefix, "true", false)
            .unwrap();
        assert_eq!(
            s.resolve_session_name(Path::new("/w/My.Project"), None, None),
            "alice-smith-my-project"
        );
    }

    #[test]
    fn test_manual_session_names() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","peerName":"alice"}"#);
        let s = store(&temp, &[]);
        let cwd = Path::new("/w/repo");

        assert_eq!(s.set_manual_session_name(cwd, "Pairing Time").unwrap(), None);
        assert_eq!(s.resolve_session_name(cwd, None, None), "pairing-time");
        assert!(s.set_manual_session_name(cwd, "!!!").is_err());

        assert_eq!(
            s.clear_manual_session_name(cwd).unwrap().as_deref(),
            Some("pairing-time")
        );
        assert_eq!(s.resolve_session_name(cwd, None, None), "alice-repo");
    }

    #[test]
    fn test_strategy_change_clears_manual_sessions() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);
        let s = store(&temp, &[]);
        s.set_manual_session_name(Path::new("/a"), "x").unwrap();
        s.set_manual_session_name(Path::new("/b"), "y").unwrap();

        // Setting the same strategy again keeps them.
        let same = s
            .set_field(ConfigField::SessionStrategy, "per-directory", false)
            .unwrap();
        assert!(same.warnings.is_empty());
        assert_eq!(s.persisted().sessions.len(), 2);

        let outcome = s
            .set_field(ConfigField::SessionStrategy, "git-branch", false)
            .unwrap();
        assert!(outcome
            .warnings
            .contains(&ConfigWarning::ManualSessionsCleared { count: 2 }));
        assert!(s.persisted().sessions.is_empty());
    }

    #[test]
    fn test_dangerous_field_requires_confirmation() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);
        let s = store(&temp, &[]);

        let outcome = s.set_field(ConfigField::Workspace, "other", false).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.previous.as_deref(), Some("claude_code"));
        assert_eq!(
            outcome.warnings,
            vec![ConfigWarning::ConfirmationRequired {
                field: ConfigField::Workspace
            }]
        );
        assert_eq!(s.load().unwrap().workspace, "claude_code");

        let outcome = s.set_field(ConfigField::Workspace, "other", true).unwrap();
        assert!(outcome.applied);
        assert_eq!(s.load().unwrap().workspace, "other");
    }

    #[test]
    fn test_identity_change_invalidates_caches() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","peerName":"alice"}"#);
        let state = StateDir::at(temp.path());
        let s = store(&temp, &[]);
        let ids = IdentifierCache::new(&state);
        let ctx = ContextCache::new(&state, 300, 30);
        ids.set(IdKind::Peer("alice"), "p-1").unwrap();
        ctx.set(ContextKind::User, ContextPayload::default()).unwrap();

        let outcome = s.set_field(ConfigField::PeerName, "bob", false).unwrap();
        assert_eq!(outcome.previous.as_deref(), Some("alice"));
        assert_eq!(outcome.invalidated.len(), 2);
        assert_eq!(outcome.invalidated[0].cache, CacheKind::Identifiers);
        assert!(ids.get(IdKind::Peer("alice")).is_none());
        assert!(ctx.get(ContextKind::User).is_none());
    }

    #[test]
    fn test_global_override_toggle_invalidates_caches() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","aiPeer":"flat-bot","hosts":{"claude_code":{"aiPeer":"host-bot"}}}"#,
        );
        let state = StateDir::at(temp.path());
        let s = store(&temp, &[]);
        let ctx = ContextCache::new(&state, 300, 30);
        ctx.set(ContextKind::Assistant, ContextPayload::default()).unwrap();
        assert_eq!(s.load().unwrap().ai_peer, "host-bot");

        let outcome = s.set_field(ConfigField::GlobalOverride, "true", false).unwrap();
        assert_eq!(s.load().unwrap().ai_peer, "flat-bot");
        assert_eq!(outcome.invalidated.len(), 2);
        assert_eq!(outcome.invalidated[1].cache, CacheKind::Context);
        assert_eq!(outcome.invalidated[1].reason, "aiPeer changed");
        assert!(ctx.get(ContextKind::Assistant).is_none());
    }

    #[test]
    fn test_shadowed_peer_name_change_clears_manual_sessions() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k","peerName":"alice"}"#);
        let s = store(&temp, &[(ENV_PEER_NAME, "envpeer")]);
        s.set_manual_session_name(Path::new("/a"), "x").unwrap();

        let outcome = s.set_field(ConfigField::PeerName, "bob", false).unwrap();
        assert!(outcome
            .warnings
            .contains(&ConfigWarning::ManualSessionsCleared { count: 1 }));
        assert!(s.persisted().sessions.is_empty());
        // The effective name is still the environment's.
        assert!(outcome.invalidated.is_empty());
    }

    #[test]
    fn test_non_identity_change_keeps_caches() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);
        let s = store(&temp, &[]);
        let outcome = s.set_field(ConfigField::Logging, "on", false).unwrap();
        assert!(outcome.invalidated.is_empty());
        assert!(s.load().unwrap().logging);
    }

    #[test]
    fn test_env_shadow_warning() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);
        let s = store(&temp, &[(ENV_PEER_NAME, "envpeer")]);
        let outcome = s.set_field(ConfigField::PeerName, "filepeer", false).unwrap();
        assert!(outcome.warnings.contains(&ConfigWarning::OverriddenByEnvironment {
            field: ConfigField::PeerName,
            variable: ENV_PEER_NAME,
        }));
        assert!(outcome.invalidated.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"k"}"#);
        let s = store(&temp, &[]);
        for (field, value) in [
            (ConfigField::ContextTtlSeconds, "-5"),
            (ConfigField::SaveMessages, "sometimes"),
            (ConfigField::SessionStrategy, "weekly"),
            (ConfigField::Endpoint, "ftp://x"),
            (ConfigField::PeerName, "  "),
        ] {
            assert!(matches!(
                s.set_field(field, value, true),
                Err(MemsyncError::InvalidConfigValue { .. })
            ));
        }
        assert_eq!(s.persisted().context_ttl_seconds, None);
    }

    #[test]
    fn test_field_name_spellings() {
        assert_eq!(
            "contextTtlSeconds".parse::<ConfigField>().unwrap(),
            ConfigField::ContextTtlSeconds
        );
        assert_eq!(
            "context_ttl_seconds".parse::<ConfigField>().unwrap(),
            ConfigField::ContextTtlSeconds
        );
        assert_eq!("ai-peer".parse::<ConfigField>().unwrap(), ConfigField::AiPeer);
        assert!(matches!(
            "colour".parse::<ConfigField>(),
            Err(MemsyncError::UnknownConfigField(_))
        ));
    }

    #[test]
    fn test_api_key_masked_in_outcome() {
        let temp = TempDir::new().unwrap();
        write_config(&temp, r#"{"apiKey":"sk-1234567890abcd"}"#);
        let outcome = store(&temp, &[])
            .set_field(ConfigField::ApiKey, "new-key", false)
            .unwrap();
        assert_eq!(outcome.previous.as_deref(), Some("****abcd"));
    }

    #[test]
    fn test_validate_flags_zero_policies() {
        let temp = TempDir::new().unwrap();
        write_config(
            &temp,
            r#"{"apiKey":"k","contextTtlSeconds":0,"messageRefreshThreshold":0}"#,
        );
        let warnings = store(&temp, &[]).validate();
        assert_eq!(warnings.len(), 2);
        assert!(store(&TempDir::new().unwrap(), &[]).validate().is_empty());
    }
}
