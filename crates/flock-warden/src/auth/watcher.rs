//! Failed-authentication tamper watcher
//!
//! Deliberately decoupled from the lock controller's lockout bookkeeping:
//! this counter arms the destructive response, not the UI lockout, so its
//! threshold can differ. Crossing the threshold fires the engine exactly
//! once; the one-shot guard stays latched until an explicit [`reset`].
//!
//! [`reset`]: FailedAuthWatcher::reset

use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::nuke::{TamperResponseEngine, TriggerSource};

#[derive(Debug, Default)]
struct FailedAuthState {
    count: u32,
    first_failure: Option<Instant>,
    triggered: bool,
}

pub struct FailedAuthWatcher {
    engine: Arc<TamperResponseEngine>,
    state: Mutex<FailedAuthState>,
}

impl FailedAuthWatcher {
    pub fn new(engine: Arc<TamperResponseEngine>) -> Self {
        Self {
            engine,
            state: Mutex::new(FailedAuthState::default()),
        }
    }

    /// Record one failed authentication attempt.
    ///
    /// Returns `true` only on the call that crosses the threshold and fires
    /// the tamper response. Disabled configuration, already-latched state,
    /// and below-threshold counts all return `false`.
    pub async fn record_failed_attempt(&self) -> bool {
        let config = self.engine.config();
        if !config.enabled || !config.failed_auth.enabled {
            return false;
        }
        let threshold = config.failed_auth.effective_threshold();

        let crossed = {
            let mut state = self.state.lock().unwrap();
            if state.triggered {
                return false;
            }

            // Stale failures outside the reset window start a fresh count
            if let (Some(first), Some(window)) =
                (state.first_failure, config.failed_auth.reset_window())
            {
                if first.elapsed() > window {
                    state.count = 0;
                    state.first_failure = None;
                }
            }

            state.count += 1;
            if state.count == 1 {
                state.first_failure = Some(Instant::now());
            }

            if state.count >= threshold {
                state.triggered = true;
                true
            } else {
                false
            }
        };

        if crossed {
            tracing::warn!(threshold, "failed-auth threshold crossed; firing tamper response");
            self.engine.trigger(TriggerSource::FailedAuth).await;
        }
        crossed
    }

    /// Clear the failure counters after a successful authentication.
    ///
    /// Does NOT clear the one-shot trigger latch: a watcher that has
    /// already fired stays fired until [`reset`](Self::reset).
    pub fn record_successful_auth(&self) {
        let mut state = self.state.lock().unwrap();
        state.count = 0;
        state.first_failure = None;
    }

    /// Explicit reset: clears the counters AND the one-shot trigger latch.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = FailedAuthState::default();
    }

    /// Attempts left before the destructive response fires, or `None` when
    /// the watcher is disabled. Never negative.
    pub fn remaining_attempts(&self) -> Option<u32> {
        let config = self.engine.config();
        if !config.enabled || !config.failed_auth.enabled {
            return None;
        }
        let threshold = config.failed_auth.effective_threshold();
        let state = self.state.lock().unwrap();
        Some(threshold.saturating_sub(state.count))
    }

    /// Whether the one-shot trigger has fired
    pub fn is_triggered(&self) -> bool {
        self.state.lock().unwrap().triggered
    }

    pub fn failure_count(&self) -> u32 {
        self.state.lock().unwrap().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NukeConfig;
    use crate::nuke::{RecordingWipeExecutor, WipeExecutor};

    fn watcher_with_threshold(threshold: u32) -> (FailedAuthWatcher, Arc<RecordingWipeExecutor>) {
        let mut config = NukeConfig {
            enabled: true,
            ..Default::default()
        };
        config.failed_auth.enabled = true;
        config.failed_auth.threshold = threshold;

        let executor = Arc::new(RecordingWipeExecutor::new());
        let engine = Arc::new(TamperResponseEngine::new(
            config,
            Arc::clone(&executor) as Arc<dyn WipeExecutor>,
        ));
        (FailedAuthWatcher::new(engine), executor)
    }

    #[tokio::test]
    async fn test_threshold_sequence_false_false_true_then_false() {
        let (watcher, executor) = watcher_with_threshold(3);

        assert!(!watcher.record_failed_attempt().await);
        assert!(!watcher.record_failed_attempt().await);
        assert!(watcher.record_failed_attempt().await);
        // One-shot: further failures stay latched
        assert!(!watcher.record_failed_attempt().await);

        assert!(watcher.is_triggered());
        assert_eq!(executor.wiped().len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_watcher_is_noop() {
        let mut config = NukeConfig {
            enabled: true,
            ..Default::default()
        };
        config.failed_auth.enabled = false;
        let engine = Arc::new(TamperResponseEngine::new(
            config,
            Arc::new(RecordingWipeExecutor::new()) as Arc<dyn WipeExecutor>,
        ));
        let watcher = FailedAuthWatcher::new(engine);

        assert!(!watcher.record_failed_attempt().await);
        assert_eq!(watcher.failure_count(), 0);
        assert_eq!(watcher.remaining_attempts(), None);
    }

    #[tokio::test]
    async fn test_master_switch_off_is_noop() {
        let mut config = NukeConfig::default();
        config.failed_auth.enabled = true;
        let engine = Arc::new(TamperResponseEngine::new(
            config,
            Arc::new(RecordingWipeExecutor::new()) as Arc<dyn WipeExecutor>,
        ));
        let watcher = FailedAuthWatcher::new(engine);

        assert!(!watcher.record_failed_attempt().await);
        assert_eq!(watcher.remaining_attempts(), None);
    }

    #[tokio::test]
    async fn test_success_clears_counters_but_not_latch() {
        let (watcher, _) = watcher_with_threshold(3);

        watcher.record_failed_attempt().await;
        watcher.record_failed_attempt().await;
        watcher.record_successful_auth();
        assert_eq!(watcher.failure_count(), 0);

        // Full threshold needed again after the counter reset
        assert!(!watcher.record_failed_attempt().await);
        assert!(!watcher.record_failed_attempt().await);
        assert!(watcher.record_failed_attempt().await);

        // Success does not unlatch a fired watcher
        watcher.record_successful_auth();
        assert!(watcher.is_triggered());
        assert!(!watcher.record_failed_attempt().await);
    }

    #[tokio::test]
    async fn test_reset_unlatches_and_cycle_repeats() {
        let (watcher, executor) = watcher_with_threshold(3);

        for _ in 0..3 {
            watcher.record_failed_attempt().await;
        }
        assert!(watcher.is_triggered());

        watcher.reset();
        watcher.engine.reset().await;
        assert!(!watcher.is_triggered());
        assert_eq!(watcher.remaining_attempts(), Some(3));

        // Identical cycle after reset
        assert!(!watcher.record_failed_attempt().await);
        assert!(!watcher.record_failed_attempt().await);
        assert!(watcher.record_failed_attempt().await);
        assert_eq!(executor.wiped().len(), 6);
    }

    #[tokio::test]
    async fn test_threshold_floor_applies() {
        // Configured below the floor: effective threshold is 3
        let (watcher, _) = watcher_with_threshold(1);
        assert_eq!(watcher.remaining_attempts(), Some(3));

        assert!(!watcher.record_failed_attempt().await);
        assert!(!watcher.record_failed_attempt().await);
        assert!(watcher.record_failed_attempt().await);
    }

    #[tokio::test]
    async fn test_remaining_attempts_never_negative() {
        let (watcher, _) = watcher_with_threshold(3);
        for _ in 0..5 {
            watcher.record_failed_attempt().await;
        }
        assert_eq!(watcher.remaining_attempts(), Some(0));
    }

    #[tokio::test]
    async fn test_concurrent_failures_trigger_exactly_once() {
        let (watcher, executor) = watcher_with_threshold(3);
        let watcher = Arc::new(watcher);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let w = Arc::clone(&watcher);
            handles.push(tokio::spawn(async move { w.record_failed_attempt().await }));
        }

        let mut fired = 0;
        for handle in handles {
            if handle.await.unwrap() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        assert_eq!(executor.wiped().len(), 3);
    }
}
