//! Error types for memsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-specific errors for memsync persistence operations.
///
/// Most read paths never surface these: a corrupt or unreadable document
/// degrades to its default value. Errors are reserved for writes that could
/// not complete and for caller input that cannot be applied.
#[derive(Error, Debug)]
pub enum MemsyncError {
    /// The per-user state directory could not be determined.
    #[error("State directory unavailable: {0}")]
    StateDirUnavailable(String),

    /// A persisted document could not be read or written.
    #[error("Store I/O error at `{path}`: {reason}")]
    StoreIo {
        /// Path of the document.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A persisted document could not be serialized or parsed.
    #[error("Store parse error at `{path}`: {reason}")]
    StoreParse {
        /// Path of the document.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// A configuration value could not be parsed for its field.
    #[error("Invalid value `{value}` for `{field}`: {reason}")]
    InvalidConfigValue {
        /// The field being set.
        field: String,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The named configuration field does not exist.
    #[error("Unknown config field `{0}`")]
    UnknownConfigField(String),

    /// The named host is not recognised.
    #[error("Unknown host `{0}`. Use `claude-code` or `cursor`.")]
    UnknownHost(String),

    /// The named session strategy is not recognised.
    #[error("Unknown session strategy `{0}`. Use `per-directory`, `git-branch` or `chat-instance`.")]
    UnknownSessionStrategy(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_io_display_includes_path() {
        let err = MemsyncError::StoreIo {
            path: PathBuf::from("/tmp/x.json"),
            reason: "denied".to_string(),
        };
        assert_eq!(err.to_string(), "Store I/O error at `/tmp/x.json`: denied");
    }

    #[test]
    fn test_invalid_config_value_display() {
        let err = MemsyncError::InvalidConfigValue {
            field: "contextTtlSeconds".to_string(),
            value: "soon".to_string(),
            reason: "expected a non-negative integer".to_string(),
        };
        assert!(err.to_string().contains("contextTtlSeconds"));
        assert!(err.to_string().contains("soon"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MemsyncError = io.into();
        assert!(matches!(err, MemsyncError::Io(_)));
    }
}
