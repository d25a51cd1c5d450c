//! Host lifecycle events and their input records.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::HookError;

// ============================================================================
// HookEvent
// ============================================================================

/// A host lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookEvent {
    SessionStart,
    UserPrompt,
    ToolUse,
    Stop,
    PreCompact,
    SessionEnd,
}

impl HookEvent {
    pub const ALL: [HookEvent; 6] = [
        Self::SessionStart,
        Self::UserPrompt,
        Self::ToolUse,
        Self::Stop,
        Self::PreCompact,
        Self::SessionEnd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::UserPrompt => "user-prompt",
            Self::ToolUse => "tool-use",
            Self::Stop => "stop",
            Self::PreCompact => "pre-compact",
            Self::SessionEnd => "session-end",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = HookError;

    /// Accepts our own names as well as the hosts' event names
    /// (`UserPromptSubmit`, `PostToolUse`, ...).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match key.as_str() {
            "sessionstart" => Ok(Self::SessionStart),
            "userprompt" | "userpromptsubmit" | "beforesubmitprompt" => Ok(Self::UserPrompt),
            "tooluse" | "posttooluse" | "afterfileedit" | "aftershellexecution" => {
                Ok(Self::ToolUse)
            }
            "stop" => Ok(Self::Stop),
            "precompact" => Ok(Self::PreCompact),
            "sessionend" => Ok(Self::SessionEnd),
            _ => Err(HookError::InvalidInput(format!("unknown event `{}`", s))),
        }
    }
}

// ============================================================================
// HookInput
// ============================================================================

/// The fields memsync reads from a host event record. Other keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HookInput {
    pub cwd: PathBuf,
    /// Identifies the running host instance.
    #[serde(default, alias = "session_id", alias = "conversation_id")]
    pub instance_id: Option<String>,
    /// Why the event fired (`startup`, `resume`, `clear`, `logout`, ...).
    #[serde(default, alias = "reason", alias = "source")]
    pub trigger: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_summary: Option<String>,
    #[serde(default, alias = "last_assistant_message")]
    pub assistant_message: Option<String>,
}

impl HookInput {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            ..Self::default()
        }
    }

    /// Parse the JSON record a host writes to the hook's stdin.
    pub fn from_json(raw: &str) -> Result<Self, HookError> {
        serde_json::from_str(raw).map_err(|e| HookError::InvalidInput(e.to_string()))
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Instance id, if non-blank.
    pub fn instance_id(&self) -> Option<&str> {
        non_blank(&self.instance_id)
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.instance_id = Some(id.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, summary: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self.tool_summary = Some(summary.into());
        self
    }

    pub fn with_assistant_message(mut self, message: impl Into<String>) -> Self {
        self.assistant_message = Some(message.into());
        self
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}
