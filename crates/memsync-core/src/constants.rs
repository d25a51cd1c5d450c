//! Common constants used throughout memsync-core.
//!
//! File names, environment variable names, and policy defaults live here so
//! that every component agrees on the on-disk layout.

// ============================================================================
// State Directory Layout
// ============================================================================

/// Name of the per-user state directory under the home directory.
pub const STATE_DIR_NAME: &str = ".memsync";

/// Durable configuration record.
pub const CONFIG_FILENAME: &str = "config.json";

/// Remote identifier cache.
pub const ID_CACHE_FILENAME: &str = "id-cache.json";

/// Fetched context payloads and message counters.
pub const CONTEXT_CACHE_FILENAME: &str = "context-cache.json";

/// Append-only log of not-yet-uploaded messages (JSONL).
pub const MESSAGE_QUEUE_FILENAME: &str = "message-queue.jsonl";

/// Last observed repository snapshot per working directory.
pub const GIT_STATE_FILENAME: &str = "git-state.json";

/// Bounded "recent work" text log.
pub const ACTIVITY_LOG_FILENAME: &str = "activity.log";

// ============================================================================
// Environment Variables
// ============================================================================

/// Relocates the state directory.
pub const ENV_HOME: &str = "MEMSYNC_HOME";
/// Forces host detection.
pub const ENV_HOST: &str = "MEMSYNC_HOST";
pub const ENV_API_KEY: &str = "MEMSYNC_API_KEY";
pub const ENV_PEER_NAME: &str = "MEMSYNC_PEER_NAME";
pub const ENV_WORKSPACE: &str = "MEMSYNC_WORKSPACE";
pub const ENV_AI_PEER: &str = "MEMSYNC_AI_PEER";
pub const ENV_ENABLED: &str = "MEMSYNC_ENABLED";
pub const ENV_LOGGING: &str = "MEMSYNC_LOGGING";
pub const ENV_ENDPOINT: &str = "MEMSYNC_ENDPOINT";

/// Set by Cursor in the environment of processes it spawns.
pub const ENV_CURSOR_MARKER: &str = "CURSOR_TRACE_ID";

/// Used for the default peer name.
pub const ENV_USER: &str = "USER";

/// Every variable [`crate::Environment::from_process`] captures.
pub const CAPTURED_ENV_VARS: &[&str] = &[
    ENV_HOME,
    ENV_HOST,
    ENV_API_KEY,
    ENV_PEER_NAME,
    ENV_WORKSPACE,
    ENV_AI_PEER,
    ENV_ENABLED,
    ENV_LOGGING,
    ENV_ENDPOINT,
    ENV_CURSOR_MARKER,
    ENV_USER,
];

// ============================================================================
// Policy Defaults
// ============================================================================

/// Default remote endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.memsync.dev";

/// Peer name used when neither config nor `$USER` provides one.
pub const DEFAULT_PEER_NAME: &str = "user";

/// Seconds a fetched context payload stays fresh.
pub const DEFAULT_CONTEXT_TTL_SECONDS: u64 = 300;

/// Outbound messages after which a context refresh is forced.
pub const DEFAULT_MESSAGE_REFRESH_THRESHOLD: u64 = 30;

/// Lines retained in the activity log.
pub const DEFAULT_MAX_ACTIVITY_ENTRIES: usize = 50;

/// Per-message character limit applied at upload time.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 25_000;

/// Character budget for rendered context text.
pub const DEFAULT_MAX_CONTEXT_CHARS: usize = 12_000;

/// Marker appended to content cut at a truncation limit.
pub const TRUNCATION_MARKER: &str = "…[truncated]";
