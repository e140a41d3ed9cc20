//! Feature flags gating the background services.
//!
//! Flags are read at the start of every periodic tick, so operators can
//! pause a background process without restarting the daemon. Reads are
//! fail-closed: a missing flag or a read error means "disabled".

use std::collections::HashMap;

use async_trait::async_trait;

/// Gates the review period closure task.
pub const ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE: &str = "ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE";
/// Gates the competency gap closure task.
pub const ENABLE_COMPETENCY_CLOSURE_BACKGROUND_SERVICE: &str =
    "ENABLE_COMPETENCY_CLOSURE_BACKGROUND_SERVICE";
/// Gates the auto-reassign task.
pub const ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE: &str =
    "ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE";

/// Read-only accessor for named boolean flags.
#[async_trait]
pub trait FeatureFlags: Send + Sync {
    /// Returns false for unknown flags and on read errors (fail-closed).
    async fn is_enabled(&self, name: &str) -> bool;
}

/// Fixed in-memory flag set. Useful for tests and for deployments that
/// configure flags at startup rather than in the database.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    flags: HashMap<String, bool>,
}

impl StaticFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, enabled: bool) -> Self {
        self.flags.insert(name.to_string(), enabled);
        self
    }
}

#[async_trait]
impl FeatureFlags for StaticFlags {
    async fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_flags_fail_closed() {
        let flags = StaticFlags::new().with(ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE, true);
        assert!(flags.is_enabled(ENABLE_REVIEW_PERIOD_BACKGROUND_SERVICE).await);
        assert!(!flags.is_enabled(ENABLE_AUTO_REASSIGN_REQUEST_BACKGROUND_SERVICE).await);
        assert!(!flags.is_enabled("NO_SUCH_FLAG").await);
    }
}
