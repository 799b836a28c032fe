//! Lock state and brute-force lockout control
//!
//! The controller owns the LOCKED/UNLOCKED cell, the escalating-lockout
//! arithmetic, and the per-attempt accounting. PIN derivation is CPU-bound
//! (PBKDF2 at 150k iterations) and runs on the blocking pool so callers on
//! latency-sensitive executors can simply await.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use zeroize::Zeroizing;

use crate::auth::credential::{Credential, CredentialStore};
use crate::auth::watcher::FailedAuthWatcher;
use crate::config::LockoutConfig;
use crate::error::Result;

/// Lock cell states
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Outcome of a PIN or biometric verification attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PinVerificationResult {
    Success,
    InvalidPin,
    /// Denied while locked out; does not consume an attempt
    LockedOut {
        remaining_ms: u64,
    },
}

#[derive(Debug, Default)]
struct LockoutState {
    consecutive_failures: u32,
    lockout_until: Option<Instant>,
    /// Monotonically non-decreasing across lockout cycles; resets only on
    /// success or explicit reset
    lockout_stage: u32,
    last_unlock: Option<Instant>,
}

pub struct LockController {
    credentials: Mutex<CredentialStore>,
    config: LockoutConfig,
    watcher: Arc<FailedAuthWatcher>,
    state: Mutex<LockoutState>,
    lock_tx: watch::Sender<LockState>,
}

impl LockController {
    pub fn new(
        credentials: CredentialStore,
        config: LockoutConfig,
        watcher: Arc<FailedAuthWatcher>,
    ) -> Self {
        let (lock_tx, _) = watch::channel(LockState::Locked);
        Self {
            credentials: Mutex::new(credentials),
            config,
            watcher,
            state: Mutex::new(LockoutState::default()),
            lock_tx,
        }
    }

    /// Engage the lock from any state.
    pub fn lock(&self) {
        self.lock_tx.send_replace(LockState::Locked);
        tracing::debug!("lock engaged");
    }

    /// Release the lock from any state (successful verification, or no
    /// credential enrolled).
    pub fn unlock(&self) {
        self.state.lock().unwrap().last_unlock = Some(Instant::now());
        self.lock_tx.send_replace(LockState::Unlocked);
        tracing::debug!("lock released");
    }

    /// Synchronous read of the lock cell
    pub fn is_locked(&self) -> bool {
        *self.lock_tx.borrow() == LockState::Locked
    }

    /// Subscribe to lock-state changes
    pub fn subscribe(&self) -> watch::Receiver<LockState> {
        self.lock_tx.subscribe()
    }

    pub fn last_unlock_time(&self) -> Option<Instant> {
        self.state.lock().unwrap().last_unlock
    }

    /// Remaining lockout window, if one is active
    pub fn lockout_remaining(&self) -> Option<Duration> {
        let state = self.state.lock().unwrap();
        state.lockout_until.and_then(|until| {
            let now = Instant::now();
            (now < until).then(|| until - now)
        })
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout_remaining().is_some()
    }

    /// Attempts left before the next lockout, or `None` when no lockout
    /// policy is active. Never negative.
    pub fn remaining_attempts(&self) -> Option<u32> {
        if self.config.max_failed_attempts == 0 {
            return None;
        }
        let state = self.state.lock().unwrap();
        Some(
            self.config
                .max_failed_attempts
                .saturating_sub(state.consecutive_failures),
        )
    }

    /// Snapshot of the enrolled primary credential
    pub fn credential(&self) -> Option<Credential> {
        self.credentials.lock().unwrap().credential().cloned()
    }

    pub fn is_credential_set(&self) -> bool {
        self.credentials.lock().unwrap().is_set()
    }

    /// Enroll or replace the primary credential (full complexity policy).
    pub fn set_credential(&self, pin: &str) -> Result<()> {
        self.credentials.lock().unwrap().set_credential(pin)
    }

    /// Remove the primary credential.
    pub fn clear_credential(&self) -> Result<()> {
        self.credentials.lock().unwrap().clear()
    }

    /// Verify a candidate PIN.
    ///
    /// Lockout is checked first and does not consume an attempt. A missing
    /// credential unlocks (first-run semantics). Derivation faults degrade
    /// to a failed verification rather than propagating.
    pub async fn verify_pin(&self, pin: &str) -> PinVerificationResult {
        if let Some(remaining) = self.lockout_remaining() {
            return PinVerificationResult::LockedOut {
                remaining_ms: remaining.as_millis() as u64,
            };
        }

        let matched = match self.credential() {
            None => true,
            Some(credential) => {
                let candidate = Zeroizing::new(pin.to_owned());
                match tokio::task::spawn_blocking(move || credential.verify(candidate.as_str()))
                    .await
                {
                    Ok(matched) => matched,
                    Err(e) => {
                        tracing::error!(error = %e, "PIN derivation task failed");
                        false
                    }
                }
            }
        };

        if matched {
            self.record_success();
            PinVerificationResult::Success
        } else {
            self.record_failure().await
        }
    }

    /// Record a biometric verification outcome. Counts and unlocks exactly
    /// like a PIN attempt but skips the hash comparison entirely.
    pub async fn record_biometric(&self, success: bool) -> PinVerificationResult {
        if let Some(remaining) = self.lockout_remaining() {
            return PinVerificationResult::LockedOut {
                remaining_ms: remaining.as_millis() as u64,
            };
        }
        if success {
            self.record_success();
            PinVerificationResult::Success
        } else {
            self.record_failure().await
        }
    }

    /// Shared success path: reset counters and stage, unlock, inform the
    /// tamper watcher.
    pub(crate) fn record_success(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.consecutive_failures = 0;
            state.lockout_stage = 0;
            state.lockout_until = None;
        }
        self.unlock();
        self.watcher.record_successful_auth();
    }

    /// Shared failure path: count the failure, engage a lockout when the
    /// threshold is reached, inform the tamper watcher.
    pub(crate) async fn record_failure(&self) -> PinVerificationResult {
        {
            let mut state = self.state.lock().unwrap();
            state.consecutive_failures += 1;

            if self.config.max_failed_attempts > 0
                && state.consecutive_failures >= self.config.max_failed_attempts
            {
                let duration = self.config.lockout_duration(state.lockout_stage);
                state.lockout_until = Some(Instant::now() + duration);
                state.lockout_stage += 1;
                // A fresh run of failures is required for the next cycle
                state.consecutive_failures = 0;
                tracing::warn!(
                    stage = state.lockout_stage,
                    lockout_ms = duration.as_millis() as u64,
                    "lockout engaged after repeated failures"
                );
            }
        }
        self.watcher.record_failed_attempt().await;
        PinVerificationResult::InvalidPin
    }

    /// Explicit reset of the lockout bookkeeping (counters, stage, window).
    pub fn reset_lockout(&self) {
        let mut state = self.state.lock().unwrap();
        state.consecutive_failures = 0;
        state.lockout_stage = 0;
        state.lockout_until = None;
    }
}
