//! Error types for the warden core

use thiserror::Error;

use crate::auth::credential::PinPolicyViolation;

/// Result type alias for warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Errors that can occur in warden operations
///
/// Authentication outcomes (wrong PIN, lockout, duress) are deliberately
/// NOT errors: they travel through the typed result enums so callers are
/// forced to handle every branch.
#[derive(Debug, Error)]
pub enum WardenError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cryptographic error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// PIN rejected by the complexity policy
    #[error("{0}")]
    WeakPin(#[from] PinPolicyViolation),

    /// No primary credential has been enrolled yet
    #[error("No credential enrolled - set a PIN first")]
    CredentialNotSet,

    /// Duress PIN must differ from the primary PIN
    #[error("Duress PIN must differ from the primary PIN")]
    DuressMatchesPrimary,

    /// Duress feature (or the master switch) is disabled
    #[error("Duress PIN feature is disabled")]
    DuressDisabled,
}

impl From<serde_json::Error> for WardenError {
    fn from(e: serde_json::Error) -> Self {
        WardenError::Serialization(e.to_string())
    }
}
