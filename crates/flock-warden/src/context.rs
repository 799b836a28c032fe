//! Explicit security context
//!
//! One [`SecurityContext`] is constructed at startup and passed by reference
//! to every call site; there is no global singleton. It wires the failure
//! watcher and lock controller to the tamper engine, attaches the duress
//! authenticator, and exposes the orchestrated authentication entry point
//! the UI uses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::credential::CredentialStore;
use crate::auth::duress::{DuressAuthenticator, DuressCheckResult};
use crate::auth::lockout::{LockController, PinVerificationResult};
use crate::auth::watcher::FailedAuthWatcher;
use crate::config::{LockoutConfig, NukeConfig};
use crate::error::{Result, WardenError};
use crate::nuke::{NukeResult, TamperResponseEngine, TriggerSource, WipeExecutor};
use crate::settings::SettingsStore;

/// Locations of the credential records
pub struct StoragePaths {
    pub credential: PathBuf,
    pub duress_credential: PathBuf,
}

impl StoragePaths {
    /// Platform-default locations under the data directory
    pub fn default_paths() -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flock-warden");
        Self::under(&base)
    }

    /// Both records under the given directory
    pub fn under(dir: &Path) -> Self {
        Self {
            credential: dir.join("credential.json"),
            duress_credential: dir.join("duress.json"),
        }
    }
}

pub struct SecurityContext {
    settings: Arc<dyn SettingsStore>,
    engine: Arc<TamperResponseEngine>,
    watcher: Arc<FailedAuthWatcher>,
    lock: Arc<LockController>,
    duress: Arc<DuressAuthenticator>,
}

impl SecurityContext {
    /// Build the component graph from the settings store, a wipe executor,
    /// and credential storage locations.
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        executor: Arc<dyn WipeExecutor>,
        paths: StoragePaths,
    ) -> Result<Self> {
        let nuke_config = NukeConfig::load(settings.as_ref());
        let lockout_config = LockoutConfig::load(settings.as_ref());

        let engine = Arc::new(TamperResponseEngine::new(nuke_config, executor));
        let watcher = Arc::new(FailedAuthWatcher::new(Arc::clone(&engine)));

        let credentials = CredentialStore::open(paths.credential)?;
        let lock = Arc::new(LockController::new(
            credentials,
            lockout_config,
            Arc::clone(&watcher),
        ));

        let duress_store = CredentialStore::open(paths.duress_credential)?;
        let duress = Arc::new(DuressAuthenticator::new(Arc::clone(&engine), duress_store));

        // Once a wipe that covered the settings category completes, the
        // in-memory authentication state is part of what was destroyed:
        // re-engage the lock, zero the counters, and forget cached
        // credentials. Weak references keep the graph acyclic.
        let hook_lock = Arc::downgrade(&lock);
        let hook_watcher = Arc::downgrade(&watcher);
        let hook_duress = Arc::downgrade(&duress);
        engine.set_completion_hook(Box::new(move |result: &NukeResult| {
            if !result.settings_wiped {
                return;
            }
            if let Some(lock) = hook_lock.upgrade() {
                lock.reset_lockout();
                lock.lock();
                if let Err(e) = lock.clear_credential() {
                    tracing::warn!(error = %e, "failed to drop cached credential after wipe");
                }
            }
            if let Some(watcher) = hook_watcher.upgrade() {
                watcher.reset();
            }
            if let Some(duress) = hook_duress.upgrade() {
                if let Err(e) = duress.remove_duress_pin() {
                    tracing::warn!(error = %e, "failed to drop cached duress credential after wipe");
                }
            }
        }));

        Ok(Self {
            settings,
            engine,
            watcher,
            lock,
            duress,
        })
    }

    pub fn engine(&self) -> &Arc<TamperResponseEngine> {
        &self.engine
    }

    pub fn watcher(&self) -> &Arc<FailedAuthWatcher> {
        &self.watcher
    }

    pub fn lock_controller(&self) -> &Arc<LockController> {
        &self.lock
    }

    pub fn duress(&self) -> &Arc<DuressAuthenticator> {
        &self.duress
    }

    pub fn settings(&self) -> &Arc<dyn SettingsStore> {
        &self.settings
    }

    /// Re-read the tamper configuration from the settings store.
    pub fn reload_config(&self) {
        self.engine
            .update_config(NukeConfig::load(self.settings.as_ref()));
    }

    /// Enroll or replace the primary PIN.
    pub fn set_pin(&self, pin: &str) -> Result<()> {
        self.lock.set_credential(pin)
    }

    /// Enroll a duress PIN (requires a primary credential first).
    pub fn set_duress_pin(&self, pin: &str) -> Result<()> {
        let normal = self.lock.credential().ok_or(WardenError::CredentialNotSet)?;
        self.duress.set_duress_pin(pin, &normal)
    }

    /// Orchestrated authentication entry point.
    ///
    /// Runs the lockout gate, classifies the candidate against both
    /// credentials, and feeds the outcome to the lock controller and
    /// failure watcher. A duress match returns `Success`: from here
    /// outward it is indistinguishable from a normal unlock, and the wipe
    /// has already been signaled on a detached task.
    pub async fn authenticate(&self, pin: &str) -> PinVerificationResult {
        if let Some(remaining) = self.lock.lockout_remaining() {
            return PinVerificationResult::LockedOut {
                remaining_ms: remaining.as_millis() as u64,
            };
        }

        let normal = self.lock.credential();
        if normal.is_none() && !self.duress.is_duress_pin_set() {
            // First run: nothing enrolled yet
            self.lock.record_success();
            return PinVerificationResult::Success;
        }

        match self.duress.check_pin(pin, normal.as_ref()).await {
            DuressCheckResult::Success | DuressCheckResult::DuressPin => {
                self.lock.record_success();
                PinVerificationResult::Success
            }
            DuressCheckResult::InvalidPin => self.lock.record_failure().await,
        }
    }

    /// Execute the destructive wipe (post-wipe state scrubbing runs via
    /// the engine's completion hook).
    pub async fn execute_nuke(&self, source: TriggerSource) -> NukeResult {
        self.engine.execute_nuke(source).await
    }

    /// Gated trigger entry point for external listeners (USB, SIM,
    /// geofence, dead-man, manual).
    pub async fn trigger(&self, source: TriggerSource) -> Option<NukeResult> {
        self.engine.trigger(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nuke::RecordingWipeExecutor;
    use crate::settings::MemorySettingsStore;
    use crate::config::keys;
    use tempfile::TempDir;

    fn context_with(
        configure: impl FnOnce(&MemorySettingsStore),
    ) -> (SecurityContext, Arc<RecordingWipeExecutor>, TempDir) {
        let dir = TempDir::new().unwrap();
        let settings = Arc::new(MemorySettingsStore::new());
        configure(&settings);
        let executor = Arc::new(RecordingWipeExecutor::new());
        let context = SecurityContext::new(
            settings,
            Arc::clone(&executor) as Arc<dyn WipeExecutor>,
            StoragePaths::under(dir.path()),
        )
        .unwrap();
        (context, executor, dir)
    }

    #[tokio::test]
    async fn test_first_run_authenticates_without_credential() {
        let (context, _, _dir) = context_with(|_| {});
        assert_eq!(
            context.authenticate("8264").await,
            PinVerificationResult::Success
        );
        assert!(!context.lock_controller().is_locked());
    }

    #[tokio::test]
    async fn test_normal_and_invalid_authentication() {
        let (context, _, _dir) = context_with(|_| {});
        context.set_pin("8264").unwrap();
        context.lock_controller().lock();

        assert_eq!(
            context.authenticate("1111").await,
            PinVerificationResult::InvalidPin
        );
        assert!(context.lock_controller().is_locked());

        assert_eq!(
            context.authenticate("8264").await,
            PinVerificationResult::Success
        );
        assert!(!context.lock_controller().is_locked());
    }

    #[tokio::test]
    async fn test_duress_unlock_is_indistinguishable() {
        let (context, executor, _dir) = context_with(|settings| {
            settings.set_bool(keys::NUKE_ENABLED, true).unwrap();
            settings.set_bool(keys::DURESS_PIN_ENABLED, true).unwrap();
        });
        context.set_pin("8264").unwrap();
        context.set_duress_pin("9317").unwrap();

        // The caller sees a plain Success
        assert_eq!(
            context.authenticate("9317").await,
            PinVerificationResult::Success
        );
        assert!(!context.lock_controller().is_locked());

        // ...while the wipe lands on a detached task
        for _ in 0..100 {
            if !executor.wiped().is_empty() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("duress wipe never executed");
    }

    #[tokio::test]
    async fn test_duress_enrollment_requires_primary() {
        let (context, _, _dir) = context_with(|settings| {
            settings.set_bool(keys::NUKE_ENABLED, true).unwrap();
            settings.set_bool(keys::DURESS_PIN_ENABLED, true).unwrap();
        });
        assert!(matches!(
            context.set_duress_pin("9317"),
            Err(WardenError::CredentialNotSet)
        ));
    }

    #[tokio::test]
    async fn test_manual_nuke_scrubs_auth_state() {
        let (context, executor, _dir) = context_with(|settings| {
            settings.set_bool(keys::NUKE_ENABLED, true).unwrap();
        });
        context.set_pin("8264").unwrap();
        context.authenticate("8264").await;
        assert!(!context.lock_controller().is_locked());

        let result = context.trigger(TriggerSource::Manual).await.unwrap();
        assert!(result.success);
        assert!(result.settings_wiped);
        assert_eq!(executor.wiped().len(), 3);

        // Settings category included: lock re-engaged, counters scrubbed
        assert!(context.lock_controller().is_locked());
        assert!(!context.watcher().is_triggered());
    }

    #[tokio::test]
    async fn test_reload_config_picks_up_changes() {
        let (context, _, _dir) = context_with(|_| {});
        assert!(!context.engine().is_nuke_enabled());

        context
            .settings()
            .set_bool(keys::NUKE_ENABLED, true)
            .unwrap();
        context
            .settings()
            .set_bool(keys::SIM_REMOVAL_TRIGGER_ENABLED, true)
            .unwrap();
        context.reload_config();

        assert!(context.engine().is_nuke_enabled());
        assert!(context.engine().is_nuke_armed());
    }
}
