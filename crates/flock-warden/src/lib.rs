//! flock-warden - Tamper-response security core
//!
//! This crate guards the Flock app's locally gathered
//! surveillance-detection data:
//! - PIN/biometric authentication with escalating lockout
//! - Duress PIN recognition (unlocks normally, wipes silently)
//! - Multi-source destructive response (USB, failed auth, duress,
//!   dead-man, SIM removal, geofence, manual)
//! - Idempotent, partial-failure-tolerant wipe execution
//!
//! Construct one [`SecurityContext`] at startup and pass it by reference;
//! external listeners deliver classified tamper signals through
//! [`SecurityContext::trigger`].

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod nuke;
pub mod settings;

pub use auth::{
    validate_pin_complexity, Credential, CredentialStore, DuressAuthenticator, DuressCheckResult,
    FailedAuthWatcher, LockController, LockState, PinPolicyViolation, PinVerificationResult,
};
pub use config::{LockoutConfig, NukeConfig, MIN_FAILED_AUTH_THRESHOLD};
pub use context::{SecurityContext, StoragePaths};
pub use error::{Result, WardenError};
pub use nuke::{
    FsWipeExecutor, NukeResult, RecordingWipeExecutor, TamperResponseEngine, TriggerSource,
    WipeExecutor,
};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore};
