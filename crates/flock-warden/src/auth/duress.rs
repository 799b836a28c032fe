//! Duress PIN recognition
//!
//! A second credential that unlocks like the real one while covertly firing
//! the tamper response. Both credentials are derived and compared on every
//! check so timing never reveals which (if either) matched, and the engine
//! signal is detached so a duress unlock is exactly as fast as a normal one.

use std::sync::{Arc, Mutex};

use zeroize::Zeroizing;

use crate::auth::credential::{validate_pin_format, Credential, CredentialStore};
use crate::error::{Result, WardenError};
use crate::nuke::{TamperResponseEngine, TriggerSource};

/// Three-way outcome of a duress-aware PIN check.
///
/// Callers that do not specifically branch on `DuressPin` must treat it
/// exactly like `Success`; the UI never reveals that a duress check
/// happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuressCheckResult {
    /// Matches the normal credential
    Success,
    /// Matches the duress credential; the tamper response has been signaled
    DuressPin,
    /// Matches neither
    InvalidPin,
}

pub struct DuressAuthenticator {
    engine: Arc<TamperResponseEngine>,
    store: Mutex<CredentialStore>,
}

impl DuressAuthenticator {
    pub fn new(engine: Arc<TamperResponseEngine>, store: CredentialStore) -> Self {
        Self {
            engine,
            store: Mutex::new(store),
        }
    }

    pub fn is_duress_pin_set(&self) -> bool {
        self.store.lock().unwrap().is_set()
    }

    /// Enroll a duress PIN.
    ///
    /// Requires the master switch and the duress feature to be enabled.
    /// Only the length/digit rules apply (a duress PIN may look mundane),
    /// but it must not verify against the normal credential.
    pub fn set_duress_pin(&self, candidate: &str, normal: &Credential) -> Result<()> {
        let config = self.engine.config();
        if !config.enabled || !config.duress_pin_enabled {
            return Err(WardenError::DuressDisabled);
        }
        validate_pin_format(candidate)?;
        if normal.verify(candidate) {
            return Err(WardenError::DuressMatchesPrimary);
        }

        self.store
            .lock()
            .unwrap()
            .store_credential(Credential::derive_new(candidate))?;
        tracing::info!("duress credential enrolled");
        Ok(())
    }

    /// Remove the duress credential.
    pub fn remove_duress_pin(&self) -> Result<()> {
        self.store.lock().unwrap().clear()?;
        tracing::info!("duress credential removed");
        Ok(())
    }

    /// Classify a candidate PIN against the normal and duress credentials.
    ///
    /// Both derivations run whenever both credentials exist, regardless of
    /// which matches. A duress match signals the engine fire-and-forget so
    /// the caller's latency is identical to a normal unlock. Derivation
    /// faults degrade to `InvalidPin`.
    pub async fn check_pin(
        &self,
        candidate: &str,
        normal: Option<&Credential>,
    ) -> DuressCheckResult {
        let normal = normal.cloned();
        let duress = self.store.lock().unwrap().credential().cloned();
        let candidate = Zeroizing::new(candidate.to_owned());

        let (is_normal, is_duress) = match tokio::task::spawn_blocking(move || {
            let is_normal = normal
                .as_ref()
                .map(|c| c.verify(candidate.as_str()))
                .unwrap_or(false);
            let is_duress = duress
                .as_ref()
                .map(|c| c.verify(candidate.as_str()))
                .unwrap_or(false);
            (is_normal, is_duress)
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "duress derivation task failed");
                (false, false)
            }
        };

        if is_normal {
            DuressCheckResult::Success
        } else if is_duress {
            self.engine.trigger_detached(TriggerSource::DuressPin);
            DuressCheckResult::DuressPin
        } else {
            DuressCheckResult::InvalidPin
        }
    }
}
