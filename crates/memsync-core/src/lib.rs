//! # memsync-core
//!
//! **memsync** – local persistence core for a memory-sync client.
//!
//! Every host lifecycle event (prompt submitted, tool used, session started or
//! ended) runs in a fresh, short-lived process. This crate holds everything
//! those processes share through the filesystem: configuration, remote
//! identifiers, fetched context, not-yet-uploaded messages, and the last
//! observed repository state. No daemon and no locks; correctness comes from
//! read-merge-write updates, atomic replacement, and directory-scoped clears.
//!
//! ## Main Types
//!
//! - [`ConfigStore`] / [`ResolvedConfig`] – multi-host configuration
//! - [`IdentifierCache`] – name → remote id, trusted only while names match
//! - [`ContextCache`] – context payloads with TTL and forced refresh
//! - [`MessageQueue`] – durable outbound queue
//! - [`GitStateCache`] – repository snapshots and change detection
//! - [`ActivityLog`] – bounded "recent work" log
//! - [`MemsyncError`] – domain-specific error type
//!
//! ## Example
//!
//! ```ignore
//! use memsync_core::{ConfigStore, Environment, MessageQueue, StateDir};
//! use std::path::Path;
//!
//! let env = Environment::from_process();
//! let state = StateDir::resolve(None, &env)?;
//! let Some(config) = ConfigStore::new(&state, env).load() else {
//!     return Ok(());
//! };
//!
//! let queue = MessageQueue::new(&state);
//! queue.enqueue("hello", &config.peer_name, Path::new("/work/repo"), None)?;
//! ```

// Modules
pub mod activity;
pub mod config;
pub mod constants;
pub mod context_cache;
pub mod environment;
pub mod errors;
pub mod git_state;
pub mod identifiers;
pub mod payload;
pub mod queue;
pub mod state_dir;
pub mod store;
pub mod text;

// Re-exports for convenience
pub use activity::ActivityLog;
pub use config::{
    CacheInvalidation, CacheKind, ConfigField, ConfigStore, ConfigUpdate, ConfigWarning,
    HostBlock, PersistedConfig, ResolvedConfig, SessionStrategy, SetFieldOutcome,
};
pub use context_cache::{CachedContext, ContextCache, ContextKind};
pub use environment::{Environment, HostKind};
pub use errors::MemsyncError;
pub use git_state::{diff, GitSnapshot, GitStateCache, GitStateChange};
pub use identifiers::{IdKind, IdentifierCache};
pub use payload::ContextPayload;
pub use queue::{MessageId, MessageQueue, QueuedMessage};
pub use state_dir::StateDir;
pub use store::DocumentStore;
