//! Credential derivation, verification, and PIN policy
//!
//! PINs are never stored. Each credential keeps a PBKDF2-HMAC-SHA256 hash,
//! its random salt, and the iteration count used, so verification re-derives
//! with identical parameters and compares in constant time.

use std::fs;
use std::path::PathBuf;

use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{Result, WardenError};

/// Minimum PIN length
pub const MIN_PIN_LENGTH: usize = 4;
/// Maximum PIN length
pub const MAX_PIN_LENGTH: usize = 8;

/// Iteration floor below which stored credentials are rejected
pub const MIN_PBKDF2_ITERATIONS: u32 = 120_000;
/// Iteration count used for newly derived credentials
pub const PBKDF2_ITERATIONS: u32 = 150_000;

/// Salt length in bytes
pub const SALT_LENGTH: usize = 32;
const HASH_LENGTH: usize = 32;

/// PINs that survive the structural checks but are notorious first guesses:
/// keypad columns/crosses and a couple of perennial favourites.
const COMMON_WEAK_PINS: &[&str] = &["2580", "0852", "1379", "9731", "5683", "6969", "1004"];

/// Key-derivation algorithm identifier, persisted with each credential so
/// the scheme can be migrated later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KdfAlgorithm {
    #[serde(rename = "pbkdf2-hmac-sha256")]
    Pbkdf2HmacSha256,
}

/// A derived credential. Never contains the raw PIN.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credential {
    #[serde(with = "hex_bytes")]
    pub hash: [u8; HASH_LENGTH],
    #[serde(with = "hex_bytes")]
    pub salt: [u8; SALT_LENGTH],
    pub algorithm: KdfAlgorithm,
    pub iterations: u32,
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("invalid length"))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Hash and salt are deliberately omitted from debug output
        f.debug_struct("Credential")
            .field("algorithm", &self.algorithm)
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Derive a fresh credential from a PIN with a random salt.
    pub fn derive_new(pin: &str) -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        OsRng.fill_bytes(&mut salt);
        let hash = Self::derive(pin, &salt, PBKDF2_ITERATIONS);
        Self {
            hash,
            salt,
            algorithm: KdfAlgorithm::Pbkdf2HmacSha256,
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Re-derive a hash with explicit parameters.
    ///
    /// CPU-bound: call sites on latency-sensitive executors should wrap
    /// this in `spawn_blocking`.
    pub fn derive(pin: &str, salt: &[u8], iterations: u32) -> [u8; HASH_LENGTH] {
        let pin_bytes = Zeroizing::new(pin.as_bytes().to_vec());
        let mut out = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(&pin_bytes, salt, iterations, &mut out);
        out
    }

    /// Verify a candidate PIN against this credential.
    ///
    /// The comparison is constant-time over the full digest, so a mismatch
    /// in the first byte takes as long as one in the last.
    pub fn verify(&self, pin: &str) -> bool {
        let mut candidate = Self::derive(pin, &self.salt, self.iterations);
        let matches = bool::from(candidate[..].ct_eq(&self.hash[..]));
        candidate.zeroize();
        matches
    }
}

/// A specific reason a PIN was rejected. The `Display` string is the
/// human-readable explanation surfaced to the user.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PinPolicyViolation {
    #[error("PIN must not be a single repeated digit")]
    RepeatedDigit,

    #[error("PIN must not be an ascending or descending digit sequence")]
    SequentialRun,

    #[error("PIN matches a commonly guessed pattern")]
    CommonPattern,

    #[error("PIN must be {MIN_PIN_LENGTH}-{MAX_PIN_LENGTH} digits (0-9 only)")]
    InvalidFormat,
}

/// Length/digit validation only (used for the duress PIN, which may be
/// deliberately unremarkable).
pub fn validate_pin_format(pin: &str) -> std::result::Result<(), PinPolicyViolation> {
    let len = pin.chars().count();
    if !(MIN_PIN_LENGTH..=MAX_PIN_LENGTH).contains(&len) || !pin.chars().all(|c| c.is_ascii_digit())
    {
        return Err(PinPolicyViolation::InvalidFormat);
    }
    Ok(())
}

/// Full complexity validation for the primary PIN.
///
/// Checks run in order: repeated digit, full-length sequential run, weak
/// patterns (dates, paired/alternating digits, the common list), then
/// length/format. The structural checks only apply to well-formed digit
/// strings, so a malformed PIN always reports the format reason.
pub fn validate_pin_complexity(pin: &str) -> std::result::Result<(), PinPolicyViolation> {
    if validate_pin_format(pin).is_err() {
        return Err(PinPolicyViolation::InvalidFormat);
    }
    let digits: Vec<u8> = pin.bytes().map(|b| b - b'0').collect();

    if digits.iter().all(|&d| d == digits[0]) {
        return Err(PinPolicyViolation::RepeatedDigit);
    }
    if is_sequential_run(&digits) {
        return Err(PinPolicyViolation::SequentialRun);
    }
    if is_common_pattern(pin, &digits) {
        return Err(PinPolicyViolation::CommonPattern);
    }
    Ok(())
}

/// Strictly ascending or descending run spanning the whole PIN (no wrap)
fn is_sequential_run(digits: &[u8]) -> bool {
    let ascending = digits
        .windows(2)
        .all(|w| i16::from(w[1]) - i16::from(w[0]) == 1);
    let descending = digits
        .windows(2)
        .all(|w| i16::from(w[0]) - i16::from(w[1]) == 1);
    ascending || descending
}

fn is_common_pattern(pin: &str, digits: &[u8]) -> bool {
    COMMON_WEAK_PINS.contains(&pin)
        || is_alternating(digits)
        || is_paired_digits(digits)
        || is_date_like(pin, digits)
}

/// ABAB... alternation of two distinct digits, any accepted length
fn is_alternating(digits: &[u8]) -> bool {
    digits[0] != digits[1]
        && digits
            .iter()
            .enumerate()
            .all(|(i, &d)| d == digits[i % 2])
}

/// Digits grouped as repeated pairs: 1122, 112233, 11223344
fn is_paired_digits(digits: &[u8]) -> bool {
    digits.len() % 2 == 0 && digits.chunks(2).all(|pair| pair[0] == pair[1])
}

/// Date-like shapes: 4-digit years, MMDD/DDMM day-month combos, and 6/8
/// digit strings that lead or trail with a plausible year.
fn is_date_like(pin: &str, digits: &[u8]) -> bool {
    match digits.len() {
        4 => is_year(pin) || is_month_day(digits),
        6 => is_month_day(&digits[..4]) || is_month_day(&digits[2..]),
        8 => {
            (is_year(&pin[..4]) && is_month_day(&digits[4..]))
                || (is_year(&pin[4..]) && is_month_day(&digits[..4]))
        }
        _ => false,
    }
}

fn is_year(s: &str) -> bool {
    matches!(s.parse::<u32>(), Ok(y) if (1900..=2099).contains(&y))
}

/// Four digits forming a valid month-day pair in either order
fn is_month_day(digits: &[u8]) -> bool {
    let first = u32::from(digits[0]) * 10 + u32::from(digits[1]);
    let second = u32::from(digits[2]) * 10 + u32::from(digits[3]);
    let mmdd = (1..=12).contains(&first) && (1..=31).contains(&second);
    let ddmm = (1..=31).contains(&first) && (1..=12).contains(&second);
    mmdd || ddmm
}

/// Credential storage format (persisted to disk)
#[derive(Serialize, Deserialize)]
struct CredentialRecord {
    credential: Credential,
    /// Version for future migrations
    version: u32,
}

/// File-backed credential persistence.
///
/// One store per credential slot: the lock controller owns the primary
/// slot, the duress authenticator owns its own file.
pub struct CredentialStore {
    storage_path: PathBuf,
    record: Option<CredentialRecord>,
}

impl CredentialStore {
    /// Open a store, loading any previously enrolled credential.
    pub fn open(storage_path: PathBuf) -> Result<Self> {
        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let record = if storage_path.exists() {
            let contents = fs::read_to_string(&storage_path)?;
            let record: CredentialRecord = serde_json::from_str(&contents)
                .map_err(|e| WardenError::Storage(format!("Failed to parse credential: {}", e)))?;
            if record.credential.iterations < MIN_PBKDF2_ITERATIONS {
                return Err(WardenError::Crypto(format!(
                    "Stored credential uses {} iterations (minimum {})",
                    record.credential.iterations, MIN_PBKDF2_ITERATIONS
                )));
            }
            Some(record)
        } else {
            None
        };

        Ok(Self {
            storage_path,
            record,
        })
    }

    /// Default path for the primary credential
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flock-warden")
            .join("credential.json")
    }

    pub fn is_set(&self) -> bool {
        self.record.is_some()
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.record.as_ref().map(|r| &r.credential)
    }

    /// Enroll a new primary credential. The PIN must pass the full
    /// complexity policy; a rejected PIN is never persisted.
    pub fn set_credential(&mut self, pin: &str) -> Result<()> {
        validate_pin_complexity(pin)?;
        self.store_credential(Credential::derive_new(pin))
    }

    /// Persist an already-derived credential (callers are responsible for
    /// whatever validation their slot requires).
    pub fn store_credential(&mut self, credential: Credential) -> Result<()> {
        let record = CredentialRecord {
            credential,
            version: 1,
        };
        self.save(&record)?;
        self.record = Some(record);
        Ok(())
    }

    /// Remove the persisted credential, if any.
    pub fn clear(&mut self) -> Result<()> {
        if self.storage_path.exists() {
            fs::remove_file(&self.storage_path)?;
        }
        self.record = None;
        Ok(())
    }

    fn save(&self, record: &CredentialRecord) -> Result<()> {
        let contents = serde_json::to_string_pretty(record)?;

        if let Some(parent) = self.storage_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = self.storage_path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)?;
        fs::rename(&temp_path, &self.storage_path)?;

        // Set restrictive permissions (Unix only)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.storage_path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_repeated_digit_rejected() {
        for pin in ["0000", "11111", "777777", "99999999"] {
            assert_eq!(
                validate_pin_complexity(pin),
                Err(PinPolicyViolation::RepeatedDigit),
                "{pin}"
            );
        }
    }

    #[test]
    fn test_sequential_runs_rejected() {
        for pin in ["1234", "3456", "456789", "01234567", "4321", "9876", "87654321"] {
            assert_eq!(
                validate_pin_complexity(pin),
                Err(PinPolicyViolation::SequentialRun),
                "{pin}"
            );
        }
    }

    #[test]
    fn test_weak_patterns_rejected() {
        // Alternating, paired, date-like, and the common list
        for pin in [
            "1212", "838383", "1122", "44556677", "1984", "2025", "0101", "3112", "311299",
            "19840512", "2580",
        ] {
            assert_eq!(
                validate_pin_complexity(pin),
                Err(PinPolicyViolation::CommonPattern),
                "{pin}"
            );
        }
    }

    #[test]
    fn test_malformed_pins_report_format_reason() {
        for pin in ["123", "123456789", "12a4", "12 45", "", "four", "12.4"] {
            assert_eq!(
                validate_pin_complexity(pin),
                Err(PinPolicyViolation::InvalidFormat),
                "{pin:?}"
            );
        }
        // Even an out-of-range repeated digit is a format problem first
        assert_eq!(
            validate_pin_complexity("111111111"),
            Err(PinPolicyViolation::InvalidFormat)
        );
    }

    #[test]
    fn test_strong_pins_accepted() {
        for pin in ["8264", "93518", "740592", "4817263"] {
            assert_eq!(validate_pin_complexity(pin), Ok(()), "{pin}");
        }
    }

    #[test]
    fn test_duress_format_check_allows_weak_patterns() {
        assert!(validate_pin_format("1111").is_ok());
        assert!(validate_pin_format("1234").is_ok());
        assert!(validate_pin_format("12a4").is_err());
        assert!(validate_pin_format("123").is_err());
    }

    #[test]
    fn test_derive_round_trip() {
        let credential = Credential::derive_new("8264");
        assert_eq!(credential.iterations, PBKDF2_ITERATIONS);
        assert!(credential.iterations >= MIN_PBKDF2_ITERATIONS);
        assert!(credential.verify("8264"));
        assert!(!credential.verify("8265"));
        assert!(!credential.verify("82640"));
    }

    #[test]
    fn test_distinct_salts_produce_distinct_hashes() {
        let a = Credential::derive_new("8264");
        let b = Credential::derive_new("8264");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_store_set_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let mut store = CredentialStore::open(path.clone()).unwrap();
        assert!(!store.is_set());

        store.set_credential("8264").unwrap();
        assert!(store.is_set());

        let reopened = CredentialStore::open(path).unwrap();
        assert!(reopened.credential().unwrap().verify("8264"));
    }

    #[test]
    fn test_store_rejects_weak_pin_without_persisting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let mut store = CredentialStore::open(path.clone()).unwrap();
        assert!(matches!(
            store.set_credential("1234"),
            Err(WardenError::WeakPin(PinPolicyViolation::SequentialRun))
        ));
        assert!(!store.is_set());
        assert!(!path.exists());
    }

    #[test]
    fn test_store_clear() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credential.json");

        let mut store = CredentialStore::open(path.clone()).unwrap();
        store.set_credential("8264").unwrap();
        store.clear().unwrap();
        assert!(!store.is_set());
        assert!(!path.exists());
        // Clearing again is a no-op
        store.clear().unwrap();
    }

    #[test]
    fn test_debug_redacts_secret_material() {
        let credential = Credential::derive_new("8264");
        let rendered = format!("{:?}", credential);
        assert!(!rendered.contains(&hex::encode(credential.hash)));
        assert!(!rendered.contains(&hex::encode(credential.salt)));
    }
}
