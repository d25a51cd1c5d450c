//! Diagnostic logging for hook processes.
//!
//! stdout belongs to the host protocol, so diagnostics go to stderr, and only
//! when the `logging` toggle is on.

use memsync_core::ResolvedConfig;
use tracing_subscriber::EnvFilter;

/// Default filter used when logging is on and `RUST_LOG` is unset.
pub fn default_filter(level: &str) -> String {
    format!("memsync_core={},memsync_hooks={}", level, level)
}

/// Install a stderr `tracing` subscriber if `config.logging` is set.
///
/// Returns whether a subscriber was installed. A subscriber that is already
/// installed is left in place.
pub fn init_logging(config: &ResolvedConfig) -> bool {
    if !config.logging {
        return false;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter("debug")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert_eq!(
            default_filter("warn"),
            "memsync_core=warn,memsync_hooks=warn"
        );
    }
}
