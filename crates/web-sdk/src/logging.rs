//! Debug-gated diagnostics. The remote program config decides whether the
//! tracker's verbose logging is emitted at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared switch for the tracker's verbose logging. Cloned handles observe
/// the same flag.
#[derive(Debug, Clone, Default)]
pub struct DebugLog {
    enabled: Arc<AtomicBool>,
}

impl DebugLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// Emit an `info` event under the `pushlap` target when the given
/// [`DebugLog`] is enabled. Accepts the same field syntax as `tracing::info!`.
#[macro_export]
macro_rules! debug_log {
    ($log:expr, $($arg:tt)+) => {
        if $log.enabled() {
            $crate::__tracing::info!(target: "pushlap", $($arg)+);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let log = DebugLog::default();
        let other = log.clone();
        assert!(!other.enabled());

        log.set_enabled(true);
        assert!(other.enabled());

        // Expands and runs in both states
        crate::debug_log!(other, affiliate_ref = "alice", "debug on");
        other.set_enabled(false);
        crate::debug_log!(other, "debug off");
    }
}
