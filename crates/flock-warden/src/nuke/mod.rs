//! Tamper response: trigger registry and destructive wipe execution
//!
//! External listeners (USB, SIM, geofence, dead-man) deliver already
//! classified signals to [`TamperResponseEngine::trigger`]; the engine owns
//! configuration gating, at-most-one execution, and per-target wipe
//! accounting. The wipe itself goes through the [`WipeExecutor`] strategy so
//! tests can swap in a recording no-op.

mod engine;
mod wipe;

pub use engine::TamperResponseEngine;
pub use wipe::{
    FsWipeExecutor, RecordingWipeExecutor, SecureWipeOptions, WipeError, WipeExecutor, WipeTarget,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Named origin of a tamper-response activation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    UsbConnection,
    FailedAuth,
    DuressPin,
    DeadManSwitch,
    SimRemoval,
    Geofence,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerSource::UsbConnection => "USB_CONNECTION",
            TriggerSource::FailedAuth => "FAILED_AUTH",
            TriggerSource::DuressPin => "DURESS_PIN",
            TriggerSource::DeadManSwitch => "DEAD_MAN_SWITCH",
            TriggerSource::SimRemoval => "SIM_REMOVAL",
            TriggerSource::Geofence => "GEOFENCE",
            TriggerSource::Manual => "MANUAL",
        };
        f.write_str(name)
    }
}

/// Outcome of one destructive-wipe execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NukeResult {
    /// True iff every attempted target succeeded
    pub success: bool,
    pub database_wiped: bool,
    pub settings_wiped: bool,
    pub cache_wiped: bool,
    /// Aggregated per-target failure summary
    pub error_message: Option<String>,
    pub trigger_source: TriggerSource,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_source_display_names() {
        assert_eq!(TriggerSource::UsbConnection.to_string(), "USB_CONNECTION");
        assert_eq!(TriggerSource::FailedAuth.to_string(), "FAILED_AUTH");
        assert_eq!(TriggerSource::DeadManSwitch.to_string(), "DEAD_MAN_SWITCH");
        assert_eq!(TriggerSource::Manual.to_string(), "MANUAL");
    }

    #[test]
    fn test_trigger_source_serde_round_trip() {
        let json = serde_json::to_string(&TriggerSource::SimRemoval).unwrap();
        assert_eq!(json, "\"SIM_REMOVAL\"");
        let back: TriggerSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, TriggerSource::SimRemoval);
    }

    #[test]
    fn test_nuke_result_serde_round_trip() {
        let result = NukeResult {
            success: false,
            database_wiped: true,
            settings_wiped: false,
            cache_wiped: true,
            error_message: Some("Settings: IO error".to_string()),
            trigger_source: TriggerSource::Geofence,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: NukeResult = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert!(back.database_wiped);
        assert_eq!(back.trigger_source, TriggerSource::Geofence);
    }
}
