//! One hook invocation: the per-event handlers.
//!
//! Every handler follows the same order:
//!
//! 1. queue outbound messages locally (durability first),
//! 2. observe repository state,
//! 3. upload whatever is pending for the directory,
//! 4. refresh context when stale or when a forced refresh is due.
//!
//! Remote failures are logged and never fail the hook. A handler only
//! returns `Err` when a message could not be written to the local queue.

use std::collections::BTreeMap;
use std::path::Path;

use memsync_core::text::truncate_chars;
use memsync_core::{
    ActivityLog, ConfigStore, ContextCache, ContextKind, ContextPayload, Environment,
    GitSnapshot, GitStateCache, GitStateChange, IdKind, IdentifierCache, MemsyncError,
    MessageId, MessageQueue, QueuedMessage, ResolvedConfig, StateDir,
};
use serde::Serialize;

use crate::errors::HookError;
use crate::event::{non_blank, HookEvent, HookInput};
use crate::render::{render_context, ContextSections};
use crate::service::{FetchOptions, KnowledgeService, OutboundMessage};

/// Activity entries included in session-start context.
const SESSION_START_ACTIVITY: usize = 10;

// ============================================================================
// HookOutcome
// ============================================================================

/// What a handler did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutcome {
    /// Text for the host to inject into the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_context: Option<String>,
    /// Repository changes observed since the last invocation here.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<GitStateChange>,
    /// Messages acknowledged by the service.
    pub uploaded: usize,
    /// Messages added to the local queue.
    pub queued: usize,
}

/// A refreshed (or cached) payload and whether it came from the network.
struct Refreshed {
    payload: Option<ContextPayload>,
    fetched: bool,
}

// ============================================================================
// Invocation
// ============================================================================

/// State shared by the handlers of one hook process.
#[derive(Debug, Clone)]
pub struct Invocation {
    config: ResolvedConfig,
    ids: IdentifierCache,
    context: ContextCache,
    queue: MessageQueue,
    git: GitStateCache,
    activity: ActivityLog,
}

impl Invocation {
    /// Load configuration and open the stores.
    ///
    /// Returns `None` when memsync is unconfigured or disabled; the hook
    /// should then exit silently.
    pub fn begin(state: &StateDir, env: Environment) -> Option<Self> {
        let config = ConfigStore::new(state, env).load()?;
        if !config.enabled {
            tracing::debug!("memsync is disabled");
            return None;
        }
        Some(Self::with_config(state, config))
    }

    pub fn with_config(state: &StateDir, config: ResolvedConfig) -> Self {
        Self {
            ids: IdentifierCache::new(state),
            context: ContextCache::from_config(state, &config),
            queue: MessageQueue::new(state),
            git: GitStateCache::new(state),
            activity: ActivityLog::new(state, config.max_activity_entries),
            config,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Dispatch `event` to its handler.
    ///
    /// `git` is the snapshot the caller captured for `input.cwd`, if any.
    pub fn run(
        &self,
        event: HookEvent,
        input: &HookInput,
        git: Option<GitSnapshot>,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        tracing::debug!("Handling {} in {}", event, input.cwd().display());
        match event {
            HookEvent::SessionStart => self.session_start(input, git, service),
            HookEvent::UserPrompt => self.user_prompt(input, git, service),
            HookEvent::ToolUse => self.tool_use(input, service),
            HookEvent::Stop => self.stop(input, service),
            HookEvent::PreCompact => self.pre_compact(input, service),
            HookEvent::SessionEnd => self.session_end(input, service),
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    pub fn session_start(
        &self,
        input: &HookInput,
        git: Option<GitSnapshot>,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        soft(self.context.reset_message_count(), "reset message count");
        let changes = self.observe(cwd, git);
        let uploaded = self.upload(cwd, service);

        let session = self.current_session(service, input);
        let user = self.refresh(ContextKind::User, false, None, session.as_deref(), service);
        let assistant =
            self.refresh(ContextKind::Assistant, false, None, session.as_deref(), service);
        let activity = self.activity.recent(SESSION_START_ACTIVITY);

        let additional_context = render_context(
            &ContextSections {
                peer_name: &self.config.peer_name,
                user: user.payload.as_ref(),
                ai_peer: &self.config.ai_peer,
                assistant: assistant.payload.as_ref(),
                changes: &changes,
                activity: &activity,
            },
            self.config.max_context_chars,
        );

        Ok(HookOutcome {
            additional_context,
            changes,
            uploaded,
            queued: 0,
        })
    }

    pub fn user_prompt(
        &self,
        input: &HookInput,
        git: Option<GitSnapshot>,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        let prompt = non_blank(&input.prompt);

        let mut queued = 0;
        if let Some(prompt) = prompt.filter(|_| self.config.save_messages) {
            let peer = self.peer_slot(&self.config.peer_name);
            self.queue.enqueue(prompt, peer, cwd, input.instance_id())?;
            queued += 1;
        }
        soft(
            self.context.increment_message_count().map(|_| ()),
            "count message",
        );

        let changes = self.observe(cwd, git);
        let uploaded = self.upload(cwd, service);

        let force = self.context.should_force_refresh();
        let session = self.current_session(service, input);
        let user = self.refresh(ContextKind::User, force, prompt, session.as_deref(), service);

        // Cached context was injected earlier in the session; only repeat
        // it when it was refetched or something changed underneath.
        let shown_changes: Vec<GitStateChange> = changes
            .iter()
            .filter(|c| !matches!(c, GitStateChange::Initial { .. }))
            .cloned()
            .collect();
        let additional_context = if user.fetched || !shown_changes.is_empty() {
            render_context(
                &ContextSections {
                    peer_name: &self.config.peer_name,
                    user: user.payload.as_ref().filter(|_| user.fetched),
                    ai_peer: &self.config.ai_peer,
                    changes: &shown_changes,
                    ..Default::default()
                },
                self.config.max_context_chars,
            )
        } else {
            None
        };

        Ok(HookOutcome {
            additional_context,
            changes,
            uploaded,
            queued,
        })
    }

    pub fn tool_use(
        &self,
        input: &HookInput,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        let summary = non_blank(&input.tool_summary);
        let entry = match (non_blank(&input.tool_name), summary) {
            (Some(name), Some(summary)) => Some(format!("{}: {}", name, summary)),
            (Some(name), None) => Some(name.to_string()),
            (None, Some(summary)) => Some(summary.to_string()),
            (None, None) => None,
        };

        let mut queued = 0;
        if let Some(entry) = entry {
            soft(self.activity.append(&entry), "append activity");
            if self.config.save_messages {
                let peer = self.peer_slot(&self.config.ai_peer);
                self.queue.enqueue(entry, peer, cwd, input.instance_id())?;
                queued += 1;
            }
        }

        let uploaded = self.upload(cwd, service);
        Ok(HookOutcome {
            uploaded,
            queued,
            ..Default::default()
        })
    }

    pub fn stop(
        &self,
        input: &HookInput,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        let mut queued = 0;
        if let Some(message) =
            non_blank(&input.assistant_message).filter(|_| self.config.save_messages)
        {
            let peer = self.peer_slot(&self.config.ai_peer);
            self.queue.enqueue(message, peer, cwd, input.instance_id())?;
            queued += 1;
        }

        let uploaded = self.upload(cwd, service);
        Ok(HookOutcome {
            uploaded,
            queued,
            ..Default::default()
        })
    }

    pub fn pre_compact(
        &self,
        input: &HookInput,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        let uploaded = self.upload(cwd, service);

        let session = self.current_session(service, input);
        let user = self.refresh(ContextKind::User, true, None, session.as_deref(), service);
        let assistant =
            self.refresh(ContextKind::Assistant, true, None, session.as_deref(), service);
        let activity = self.activity.recent(SESSION_START_ACTIVITY);

        let additional_context = render_context(
            &ContextSections {
                peer_name: &self.config.peer_name,
                user: user.payload.as_ref(),
                ai_peer: &self.config.ai_peer,
                assistant: assistant.payload.as_ref(),
                activity: &activity,
                ..Default::default()
            },
            self.config.max_context_chars,
        );

        Ok(HookOutcome {
            additional_context,
            uploaded,
            ..Default::default()
        })
    }

    pub fn session_end(
        &self,
        input: &HookInput,
        service: &dyn KnowledgeService,
    ) -> Result<HookOutcome, HookError> {
        let cwd = input.cwd();
        let uploaded = self.upload(cwd, service);
        let reason = non_blank(&input.trigger).unwrap_or("exit");
        soft(
            self.activity.append(&format!(
                "Session ended in {} ({})",
                cwd.display(),
                reason
            )),
            "append activity",
        );
        Ok(HookOutcome {
            uploaded,
            ..Default::default()
        })
    }

    // ========================================================================
    // Shared steps
    // ========================================================================

    fn observe(&self, cwd: &Path, git: Option<GitSnapshot>) -> Vec<GitStateChange> {
        let Some(snapshot) = git else {
            return Vec::new();
        };
        match self.git.observe(cwd, snapshot) {
            Ok(changes) => changes,
            Err(e) => {
                tracing::warn!("Failed to record git state: {}", e);
                Vec::new()
            }
        }
    }

    /// Cached peer id, or the peer name itself.
    fn peer_slot(&self, peer_name: &str) -> String {
        self.ids
            .get(IdKind::Peer(peer_name))
            .unwrap_or_else(|| peer_name.to_string())
    }

    /// Upload everything pending for `cwd`. Returns the number acknowledged.
    ///
    /// Messages are grouped by instance id so that, under the chat-instance
    /// strategy, each running session's messages reach its own session.
    fn upload(&self, cwd: &Path, service: &dyn KnowledgeService) -> usize {
        let pending = self.queue.list_pending(Some(cwd));
        if pending.is_empty() {
            return 0;
        }
        if self.workspace_id(service).is_none() {
            return 0;
        }

        let mut groups: BTreeMap<Option<String>, Vec<QueuedMessage>> = BTreeMap::new();
        for message in pending {
            groups
                .entry(message.instance_id.clone())
                .or_default()
                .push(message);
        }

        let snapshot = self.git.get(cwd);
        let mut uploaded = 0;
        for (instance_id, messages) in groups {
            let name =
                self.config
                    .resolve_session_name(cwd, snapshot.as_ref(), instance_id.as_deref());
            let Some(session_id) = self.session_id(service, cwd, &name) else {
                continue;
            };

            let outbound: Vec<OutboundMessage> = messages
                .iter()
                .map(|m| OutboundMessage {
                    peer_id: m.peer_id.clone(),
                    content: truncate_chars(&m.content, self.config.max_message_chars),
                    timestamp: m.timestamp,
                })
                .collect();

            match service.send_messages(&session_id, &outbound) {
                Ok(()) => {
                    let ids: Vec<MessageId> = messages.into_iter().map(|m| m.id).collect();
                    match self.queue.remove(&ids) {
                        Ok(_) => {}
                        Err(e) => tracing::warn!("Uploaded messages could not be dequeued: {}", e),
                    }
                    uploaded += ids.len();
                }
                Err(e) => {
                    tracing::warn!(
                        "Upload of {} message(s) to session {} failed; keeping them queued: {}",
                        outbound.len(),
                        name,
                        e
                    );
                }
            }
        }
        uploaded
    }

    /// Payload for `kind`, fetched when forced, stale, or missing.
    ///
    /// A failed fetch falls back to whatever is cached.
    fn refresh(
        &self,
        kind: ContextKind,
        force: bool,
        query: Option<&str>,
        session: Option<&str>,
        service: &dyn KnowledgeService,
    ) -> Refreshed {
        if !force {
            if let Some(payload) = self.context.get_fresh(kind) {
                return Refreshed {
                    payload: Some(payload),
                    fetched: false,
                };
            }
        }

        let cached = || Refreshed {
            payload: self.context.get(kind),
            fetched: false,
        };

        let peer_name = match kind {
            ContextKind::User => &self.config.peer_name,
            ContextKind::Assistant => &self.config.ai_peer,
        };
        if self.workspace_id(service).is_none() {
            return cached();
        }
        let Some(peer_id) = self.peer_id(service, peer_name) else {
            return cached();
        };

        let mut options = FetchOptions::new().with_max_chars(self.config.max_context_chars);
        if let Some(query) = query {
            options = options.with_search_query(truncate_chars(query, self.config.max_context_chars));
        }
        if let Some(session) = session {
            options = options.with_session(session);
        }

        match service.fetch_context(&peer_id, &options) {
            Ok(payload) => {
                soft(self.context.set(kind, payload.clone()), "cache context");
                if kind == ContextKind::User {
                    soft(self.context.mark_refreshed(), "mark refreshed");
                }
                Refreshed {
                    payload: Some(payload),
                    fetched: true,
                }
            }
            Err(e) => {
                tracing::warn!("Context fetch for {} failed; using cache: {}", peer_name, e);
                cached()
            }
        }
    }

    /// Session id for the conversation `input` belongs to, resolved the
    /// same way uploads resolve it.
    fn current_session(&self, service: &dyn KnowledgeService, input: &HookInput) -> Option<String> {
        self.workspace_id(service)?;
        let cwd = input.cwd();
        let snapshot = self.git.get(cwd);
        let name = self
            .config
            .resolve_session_name(cwd, snapshot.as_ref(), input.instance_id());
        self.session_id(service, cwd, &name)
    }

    fn workspace_id(&self, service: &dyn KnowledgeService) -> Option<String> {
        let name = &self.config.workspace;
        if let Some(id) = self.ids.get(IdKind::Workspace(name)) {
            return Some(id);
        }
        match service.resolve_workspace(name) {
            Ok(id) => {
                soft(self.ids.set(IdKind::Workspace(name), id.clone()), "cache workspace id");
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Could not resolve workspace {}: {}", name, e);
                None
            }
        }
    }

    fn peer_id(&self, service: &dyn KnowledgeService, name: &str) -> Option<String> {
        if let Some(id) = self.ids.get(IdKind::Peer(name)) {
            return Some(id);
        }
        match service.resolve_peer(name) {
            Ok(id) => {
                soft(self.ids.set(IdKind::Peer(name), id.clone()), "cache peer id");
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Could not resolve peer {}: {}", name, e);
                None
            }
        }
    }

    fn session_id(&self, service: &dyn KnowledgeService, cwd: &Path, name: &str) -> Option<String> {
        let kind = IdKind::Session { cwd, name };
        if let Some(id) = self.ids.get(kind) {
            return Some(id);
        }
        match service.resolve_session(name) {
            Ok(id) => {
                soft(self.ids.set(kind, id.clone()), "cache session id");
                Some(id)
            }
            Err(e) => {
                tracing::warn!("Could not resolve session {}: {}", name, e);
                None
            }
        }
    }
}

/// Log a failed local write that the hook can live without.
fn soft(result: Result<(), MemsyncError>, what: &str) {
    if let Err(e) = result {
        tracing::warn!("Failed to {}: {}", what, e);
    }
}
