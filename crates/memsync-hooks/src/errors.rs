//! Error types for memsync-hooks.

use memsync_core::MemsyncError;
use thiserror::Error;

/// Result type alias for knowledge-service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures reported by a [`crate::KnowledgeService`] implementation.
///
/// Hooks never abort on these; they log and fall back to cached state.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service could not be reached.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The API key was rejected.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// The service answered with an error status.
    #[error("Service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors that make a hook invocation fail.
///
/// Only failures that would break the durability guarantee surface here:
/// a message that could not be queued, or an event record that could not be
/// read at all.
#[derive(Debug, Error)]
pub enum HookError {
    /// A local persistence operation failed.
    #[error(transparent)]
    Core(#[from] MemsyncError),

    /// The host's event record was not valid.
    #[error("Invalid hook input: {0}")]
    InvalidInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::Service {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Service error (503): unavailable");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: HookError = MemsyncError::UnknownHost("vim".to_string()).into();
        assert!(err.to_string().starts_with("Unknown host `vim`"));
    }
}
