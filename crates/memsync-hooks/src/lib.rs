//! # memsync-hooks
//!
//! Lifecycle hook entry points for memsync.
//!
//! A host (Claude Code, Cursor, ...) runs one short-lived process per
//! lifecycle event and hands it a JSON record on stdin. This crate turns that
//! record into calls on the `memsync-core` stores and a caller-supplied
//! [`KnowledgeService`], and reports what happened as a [`HookOutcome`].
//!
//! ## Example
//!
//! ```ignore
//! use memsync_core::Environment;
//! use memsync_hooks::{handle_event, HookEvent};
//!
//! let outcome = handle_event(
//!     HookEvent::UserPrompt,
//!     &stdin_json,
//!     None,
//!     Environment::from_process(),
//!     git_snapshot,
//!     &client,
//! )?;
//! if let Some(text) = outcome.and_then(|o| o.additional_context) {
//!     println!("{}", text);
//! }
//! ```

pub mod errors;
pub mod event;
pub mod invocation;
pub mod logging;
pub mod render;
pub mod service;

use std::path::Path;

use memsync_core::{Environment, GitSnapshot, StateDir};

pub use errors::{HookError, ServiceError, ServiceResult};
pub use event::{HookEvent, HookInput};
pub use invocation::{HookOutcome, Invocation};
pub use logging::init_logging;
pub use service::{FetchOptions, KnowledgeService, OutboundMessage};

/// Run one hook from its raw event record.
///
/// Returns `Ok(None)` when memsync is unconfigured or disabled. The state
/// directory is `state_dir` if given, else resolved from `env`.
pub fn handle_event(
    event: HookEvent,
    raw_input: &str,
    state_dir: Option<&Path>,
    env: Environment,
    git: Option<GitSnapshot>,
    service: &dyn KnowledgeService,
) -> Result<Option<HookOutcome>, HookError> {
    let state = StateDir::resolve(state_dir, &env)?;
    let Some(invocation) = Invocation::begin(&state, env) else {
        return Ok(None);
    };
    init_logging(invocation.config());

    let input = HookInput::from_json(raw_input)?;
    invocation.run(event, &input, git, service).map(Some)
}
