//! Authentication for the warden core
//!
//! Credential hashing and policy, the lock/lockout controller, duress
//! recognition, and the failed-attempt tamper watcher. ALL access to the
//! protected detection data MUST go through this module.
//!
//! # Security Model
//!
//! - PINs are hashed with PBKDF2-HMAC-SHA256 (150k iterations, random salt)
//! - Verification compares digests in constant time
//! - Escalating lockout slows brute force at the UI
//! - An independent failure watcher arms the destructive response
//! - A duress credential unlocks normally while silently firing the wipe

pub mod credential;
pub mod duress;
pub mod lockout;
pub mod watcher;

pub use credential::{
    validate_pin_complexity, validate_pin_format, Credential, CredentialStore, KdfAlgorithm,
    PinPolicyViolation, MAX_PIN_LENGTH, MIN_PIN_LENGTH,
};
pub use duress::{DuressAuthenticator, DuressCheckResult};
pub use lockout::{LockController, LockState, PinVerificationResult};
pub use watcher::FailedAuthWatcher;
