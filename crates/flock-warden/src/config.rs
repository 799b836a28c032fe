//! Tamper-response and lockout configuration
//!
//! All options live in the external key-value settings store under the key
//! names in [`keys`]. Loading is tolerant: absent or unparseable values fall
//! back to defaults so a half-wiped settings file can never brick the core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::nuke::TriggerSource;
use crate::settings::SettingsStore;

/// Configurable floor for the failed-authentication trigger threshold.
/// Values below this are clamped at load time.
pub const MIN_FAILED_AUTH_THRESHOLD: u32 = 3;

/// Default number of secure-wipe overwrite passes
pub const DEFAULT_SECURE_WIPE_PASSES: u32 = 3;

/// Recognized settings keys
pub mod keys {
    pub const NUKE_ENABLED: &str = "nukeEnabled";

    pub const USB_TRIGGER_ENABLED: &str = "usbTriggerEnabled";
    pub const USB_ON_DATA_CONNECTION: &str = "usbOnDataConnection";
    pub const USB_ON_ADB_CONNECTION: &str = "usbOnAdbConnection";
    pub const USB_DELAY_SECONDS: &str = "usbDelaySeconds";

    pub const FAILED_AUTH_TRIGGER_ENABLED: &str = "failedAuthTriggerEnabled";
    pub const FAILED_AUTH_THRESHOLD: &str = "failedAuthThreshold";
    pub const FAILED_AUTH_RESET_HOURS: &str = "failedAuthResetHours";

    pub const DEAD_MAN_SWITCH_ENABLED: &str = "deadManSwitchEnabled";
    pub const DEAD_MAN_HOURS: &str = "deadManHours";
    pub const DEAD_MAN_WARNING_ENABLED: &str = "deadManWarningEnabled";
    pub const DEAD_MAN_WARNING_HOURS: &str = "deadManWarningHours";

    pub const DURESS_PIN_ENABLED: &str = "duressPinEnabled";
    pub const SIM_REMOVAL_TRIGGER_ENABLED: &str = "simRemovalTriggerEnabled";

    pub const GEOFENCE_TRIGGER_ENABLED: &str = "geofenceTriggerEnabled";
    pub const GEOFENCE_LIST: &str = "geofenceList";

    pub const WIPE_DATABASE: &str = "wipeDatabase";
    pub const WIPE_SETTINGS: &str = "wipeSettings";
    pub const WIPE_CACHE: &str = "wipeCache";
    pub const SECURE_WIPE: &str = "secureWipe";
    pub const SECURE_WIPE_PASSES: &str = "secureWipePasses";

    pub const MAX_FAILED_ATTEMPTS: &str = "maxFailedAttempts";
    pub const LOCKOUT_DURATION_MS: &str = "lockoutDurationMs";
    pub const ESCALATING_LOCKOUT: &str = "escalatingLockout";
    pub const MAX_LOCKOUT_DURATION_MS: &str = "maxLockoutDurationMs";
}

/// USB tamper trigger options
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsbTriggerConfig {
    pub enabled: bool,
    /// Fire on any data (MTP/PTP) connection, not just charging
    pub on_data_connection: bool,
    /// Fire when an ADB/debug connection is established
    pub on_adb_connection: bool,
    /// Grace delay before the wipe starts (the wipe itself is not
    /// cancellable once started)
    pub delay_seconds: u32,
}

impl Default for UsbTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            on_data_connection: true,
            on_adb_connection: true,
            delay_seconds: 0,
        }
    }
}

/// Failed-authentication tamper trigger options
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailedAuthTriggerConfig {
    pub enabled: bool,
    /// Failures before the destructive response fires; never effective
    /// below [`MIN_FAILED_AUTH_THRESHOLD`]
    pub threshold: u32,
    /// Failures older than this window no longer count toward the
    /// threshold (0 disables the window)
    pub reset_hours: u32,
}

impl Default for FailedAuthTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 5,
            reset_hours: 24,
        }
    }
}

impl FailedAuthTriggerConfig {
    /// Threshold with the configured floor applied
    pub fn effective_threshold(&self) -> u32 {
        self.threshold.max(MIN_FAILED_AUTH_THRESHOLD)
    }

    /// Reset window as a duration, if one is configured
    pub fn reset_window(&self) -> Option<Duration> {
        (self.reset_hours > 0).then(|| Duration::from_secs(u64::from(self.reset_hours) * 3600))
    }
}

/// Dead-man switch options. The check-in sensing lives in an external
/// listener; the core only persists its policy and accepts its trigger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadManConfig {
    pub enabled: bool,
    /// Hours without a check-in before the switch fires
    pub hours: u32,
    pub warning_enabled: bool,
    /// Hours before the deadline at which the warning is shown
    pub warning_hours: u32,
}

impl Default for DeadManConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            hours: 72,
            warning_enabled: true,
            warning_hours: 12,
        }
    }
}

/// Geofence tamper trigger options
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeofenceConfig {
    pub enabled: bool,
    /// Named geofences the external location listener watches
    pub fences: Vec<String>,
}

/// Master tamper-response configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NukeConfig {
    /// Master switch; nothing fires while this is off
    pub enabled: bool,
    pub usb: UsbTriggerConfig,
    pub failed_auth: FailedAuthTriggerConfig,
    pub dead_man: DeadManConfig,
    pub duress_pin_enabled: bool,
    pub sim_removal_enabled: bool,
    pub geofence: GeofenceConfig,
    pub wipe_database: bool,
    pub wipe_settings: bool,
    pub wipe_cache: bool,
    pub secure_wipe: bool,
    pub secure_wipe_passes: u32,
}

impl Default for NukeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            usb: UsbTriggerConfig::default(),
            failed_auth: FailedAuthTriggerConfig::default(),
            dead_man: DeadManConfig::default(),
            duress_pin_enabled: false,
            sim_removal_enabled: false,
            geofence: GeofenceConfig::default(),
            wipe_database: true,
            wipe_settings: true,
            wipe_cache: true,
            secure_wipe: false,
            secure_wipe_passes: DEFAULT_SECURE_WIPE_PASSES,
        }
    }
}

impl NukeConfig {
    /// Armed = master switch on AND at least one trigger source enabled
    pub fn is_armed(&self) -> bool {
        self.enabled
            && (self.usb.enabled
                || self.failed_auth.enabled
                || self.dead_man.enabled
                || self.duress_pin_enabled
                || self.sim_removal_enabled
                || self.geofence.enabled)
    }

    /// Per-source gating. `Manual` needs only the master switch; there is
    /// no enable flag for an operator-initiated command.
    pub fn is_source_enabled(&self, source: TriggerSource) -> bool {
        match source {
            TriggerSource::UsbConnection => self.usb.enabled,
            TriggerSource::FailedAuth => self.failed_auth.enabled,
            TriggerSource::DuressPin => self.duress_pin_enabled,
            TriggerSource::DeadManSwitch => self.dead_man.enabled,
            TriggerSource::SimRemoval => self.sim_removal_enabled,
            TriggerSource::Geofence => self.geofence.enabled,
            TriggerSource::Manual => true,
        }
    }

    /// Load from the settings store, falling back to defaults per key.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let d = Self::default();
        Self {
            enabled: store.get_bool(keys::NUKE_ENABLED).unwrap_or(d.enabled),
            usb: UsbTriggerConfig {
                enabled: store
                    .get_bool(keys::USB_TRIGGER_ENABLED)
                    .unwrap_or(d.usb.enabled),
                on_data_connection: store
                    .get_bool(keys::USB_ON_DATA_CONNECTION)
                    .unwrap_or(d.usb.on_data_connection),
                on_adb_connection: store
                    .get_bool(keys::USB_ON_ADB_CONNECTION)
                    .unwrap_or(d.usb.on_adb_connection),
                delay_seconds: store
                    .get_u32(keys::USB_DELAY_SECONDS)
                    .unwrap_or(d.usb.delay_seconds),
            },
            failed_auth: FailedAuthTriggerConfig {
                enabled: store
                    .get_bool(keys::FAILED_AUTH_TRIGGER_ENABLED)
                    .unwrap_or(d.failed_auth.enabled),
                threshold: store
                    .get_u32(keys::FAILED_AUTH_THRESHOLD)
                    .unwrap_or(d.failed_auth.threshold)
                    .max(MIN_FAILED_AUTH_THRESHOLD),
                reset_hours: store
                    .get_u32(keys::FAILED_AUTH_RESET_HOURS)
                    .unwrap_or(d.failed_auth.reset_hours),
            },
            dead_man: DeadManConfig {
                enabled: store
                    .get_bool(keys::DEAD_MAN_SWITCH_ENABLED)
                    .unwrap_or(d.dead_man.enabled),
                hours: store.get_u32(keys::DEAD_MAN_HOURS).unwrap_or(d.dead_man.hours),
                warning_enabled: store
                    .get_bool(keys::DEAD_MAN_WARNING_ENABLED)
                    .unwrap_or(d.dead_man.warning_enabled),
                warning_hours: store
                    .get_u32(keys::DEAD_MAN_WARNING_HOURS)
                    .unwrap_or(d.dead_man.warning_hours),
            },
            duress_pin_enabled: store
                .get_bool(keys::DURESS_PIN_ENABLED)
                .unwrap_or(d.duress_pin_enabled),
            sim_removal_enabled: store
                .get_bool(keys::SIM_REMOVAL_TRIGGER_ENABLED)
                .unwrap_or(d.sim_removal_enabled),
            geofence: GeofenceConfig {
                enabled: store
                    .get_bool(keys::GEOFENCE_TRIGGER_ENABLED)
                    .unwrap_or(d.geofence.enabled),
                fences: store
                    .get(keys::GEOFENCE_LIST)
                    .map(|v| parse_list(&v))
                    .unwrap_or_default(),
            },
            wipe_database: store.get_bool(keys::WIPE_DATABASE).unwrap_or(d.wipe_database),
            wipe_settings: store.get_bool(keys::WIPE_SETTINGS).unwrap_or(d.wipe_settings),
            wipe_cache: store.get_bool(keys::WIPE_CACHE).unwrap_or(d.wipe_cache),
            secure_wipe: store.get_bool(keys::SECURE_WIPE).unwrap_or(d.secure_wipe),
            secure_wipe_passes: store
                .get_u32(keys::SECURE_WIPE_PASSES)
                .unwrap_or(d.secure_wipe_passes)
                .max(1),
        }
    }

    /// Persist every option to the settings store.
    pub fn store(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_bool(keys::NUKE_ENABLED, self.enabled)?;

        store.set_bool(keys::USB_TRIGGER_ENABLED, self.usb.enabled)?;
        store.set_bool(keys::USB_ON_DATA_CONNECTION, self.usb.on_data_connection)?;
        store.set_bool(keys::USB_ON_ADB_CONNECTION, self.usb.on_adb_connection)?;
        store.set_u32(keys::USB_DELAY_SECONDS, self.usb.delay_seconds)?;

        store.set_bool(keys::FAILED_AUTH_TRIGGER_ENABLED, self.failed_auth.enabled)?;
        store.set_u32(keys::FAILED_AUTH_THRESHOLD, self.failed_auth.threshold)?;
        store.set_u32(keys::FAILED_AUTH_RESET_HOURS, self.failed_auth.reset_hours)?;

        store.set_bool(keys::DEAD_MAN_SWITCH_ENABLED, self.dead_man.enabled)?;
        store.set_u32(keys::DEAD_MAN_HOURS, self.dead_man.hours)?;
        store.set_bool(keys::DEAD_MAN_WARNING_ENABLED, self.dead_man.warning_enabled)?;
        store.set_u32(keys::DEAD_MAN_WARNING_HOURS, self.dead_man.warning_hours)?;

        store.set_bool(keys::DURESS_PIN_ENABLED, self.duress_pin_enabled)?;
        store.set_bool(keys::SIM_REMOVAL_TRIGGER_ENABLED, self.sim_removal_enabled)?;

        store.set_bool(keys::GEOFENCE_TRIGGER_ENABLED, self.geofence.enabled)?;
        store.set(keys::GEOFENCE_LIST, &self.geofence.fences.join(","))?;

        store.set_bool(keys::WIPE_DATABASE, self.wipe_database)?;
        store.set_bool(keys::WIPE_SETTINGS, self.wipe_settings)?;
        store.set_bool(keys::WIPE_CACHE, self.wipe_cache)?;
        store.set_bool(keys::SECURE_WIPE, self.secure_wipe)?;
        store.set_u32(keys::SECURE_WIPE_PASSES, self.secure_wipe_passes)?;

        Ok(())
    }
}

/// Lockout policy for the lock controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failures before a lockout engages (0 disables lockout)
    pub max_failed_attempts: u32,
    /// Base lockout duration in milliseconds
    pub lockout_duration_ms: u64,
    /// Double the duration on every consecutive lockout cycle
    pub escalating_lockout: bool,
    /// Ceiling for escalated lockout durations
    pub max_lockout_duration_ms: u64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration_ms: 30_000,
            escalating_lockout: true,
            max_lockout_duration_ms: 30 * 60 * 1000,
        }
    }
}

impl LockoutConfig {
    /// Lockout duration for the given escalation stage:
    /// `min(base * 2^stage, max)` when escalation is enabled, otherwise
    /// the fixed base duration.
    pub fn lockout_duration(&self, stage: u32) -> Duration {
        let ms = if self.escalating_lockout {
            let factor = if stage >= 63 { u64::MAX } else { 1u64 << stage };
            self.lockout_duration_ms
                .saturating_mul(factor)
                .min(self.max_lockout_duration_ms)
        } else {
            self.lockout_duration_ms
        };
        Duration::from_millis(ms)
    }

    /// Load from the settings store, falling back to defaults per key.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let d = Self::default();
        Self {
            max_failed_attempts: store
                .get_u32(keys::MAX_FAILED_ATTEMPTS)
                .unwrap_or(d.max_failed_attempts),
            lockout_duration_ms: store
                .get_u64(keys::LOCKOUT_DURATION_MS)
                .unwrap_or(d.lockout_duration_ms),
            escalating_lockout: store
                .get_bool(keys::ESCALATING_LOCKOUT)
                .unwrap_or(d.escalating_lockout),
            max_lockout_duration_ms: store
                .get_u64(keys::MAX_LOCKOUT_DURATION_MS)
                .unwrap_or(d.max_lockout_duration_ms),
        }
    }

    /// Persist to the settings store.
    pub fn store(&self, store: &dyn SettingsStore) -> Result<()> {
        store.set_u32(keys::MAX_FAILED_ATTEMPTS, self.max_failed_attempts)?;
        store.set_u64(keys::LOCKOUT_DURATION_MS, self.lockout_duration_ms)?;
        store.set_bool(keys::ESCALATING_LOCKOUT, self.escalating_lockout)?;
        store.set_u64(keys::MAX_LOCKOUT_DURATION_MS, self.max_lockout_duration_ms)?;
        Ok(())
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
