//! Plain-text context injected back into the host.

use memsync_core::text::truncate_chars;
use memsync_core::{ContextPayload, GitStateChange};

/// Everything that may appear in the injected text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSections<'a> {
    pub peer_name: &'a str,
    pub user: Option<&'a ContextPayload>,
    pub ai_peer: &'a str,
    pub assistant: Option<&'a ContextPayload>,
    pub changes: &'a [GitStateChange],
    pub activity: &'a [String],
}

/// Render `sections` as markdown, cut to `max_chars`.
///
/// Returns `None` when there is nothing to say.
pub fn render_context(sections: &ContextSections<'_>, max_chars: usize) -> Option<String> {
    let mut blocks = Vec::new();

    if let Some(user) = sections.user.filter(|p| !p.is_empty()) {
        blocks.push(payload_block(
            &format!("What memsync knows about {}", sections.peer_name),
            user,
        ));
    }
    if let Some(assistant) = sections.assistant.filter(|p| !p.is_empty()) {
        blocks.push(payload_block(
            &format!("Notes from {}", sections.ai_peer),
            assistant,
        ));
    }
    if !sections.changes.is_empty() {
        blocks.push(list_block(
            "Repository changes",
            sections.changes.iter().map(|c| c.to_string()),
        ));
    }
    if !sections.activity.is_empty() {
        blocks.push(list_block("Recent activity", sections.activity.iter().cloned()));
    }

    if blocks.is_empty() || max_chars == 0 {
        return None;
    }
    Some(truncate_chars(&blocks.join("\n\n"), max_chars))
}

fn payload_block(title: &str, payload: &ContextPayload) -> String {
    let mut out = format!("## {}", title);
    if let Some(repr) = payload.representation() {
        out.push('\n');
        out.push_str(repr);
    }
    for line in payload.peer_card().into_iter().chain(payload.conclusions()) {
        out.push_str("\n- ");
        out.push_str(line);
    }
    out
}

fn list_block(title: &str, items: impl Iterator<Item = String>) -> String {
    let mut out = format!("## {}", title);
    for item in items {
        out.push_str("\n- ");
        out.push_str(&item);
    }
    out
}
