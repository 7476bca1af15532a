//! Strong type definitions for the Attestor kernel.
//!
//! Hashes and instants are newtypes so that a hex string or a loose
//! `DateTime` can never stand in for one by accident. Both serialize to the
//! exact text form that participates in canonical hashing.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

use crate::error::CoreError;

/// A 32-byte SHA-256 digest.
///
/// On the wire a digest is always 64 lowercase hex characters. Parsing
/// rejects any other rendering so that a digest has exactly one textual form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    /// The all-zero digest standing in for "no previous hash".
    pub const GENESIS: Self = Self([0u8; 32]);

    /// Create a digest from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to the canonical 64-character lowercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from a 64-character lowercase hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() != 64 || !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(CoreError::MalformedDigest(s.to_string()));
        }
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr).map_err(|e| CoreError::MalformedDigest(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Compare two digests in time independent of where they first differ.
    pub fn ct_eq(&self, other: &Digest) -> bool {
        self.0.ct_eq(&other.0).into()
    }

    /// Check whether this is the genesis sentinel.
    pub fn is_genesis(&self) -> bool {
        self.ct_eq(&Self::GENESIS)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// A UTC instant with millisecond precision.
///
/// Rendered as ISO-8601 with exactly three fractional digits and a literal
/// `Z` suffix, e.g. `2026-01-01T00:00:00.000Z`. Parsing only accepts that
/// exact rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The current wall-clock time, truncated to milliseconds.
    ///
    /// Only issuer-side code calls this. Verification always takes `now`
    /// from its caller.
    pub fn now() -> Self {
        Self(Utc::now().trunc_subsecs(3))
    }

    /// Create from Unix milliseconds.
    pub fn from_millis(millis: i64) -> Option<Self> {
        Utc.timestamp_millis_opt(millis).single().map(Self)
    }

    /// Unix milliseconds.
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parse the canonical ISO-8601 rendering.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let parsed = DateTime::parse_from_rfc3339(s)
            .map_err(|e| CoreError::MalformedTimestamp(format!("{s}: {e}")))?;
        let ts = Self(parsed.with_timezone(&Utc));
        if ts.to_iso8601() != s {
            return Err(CoreError::MalformedTimestamp(format!(
                "{s}: expected canonical form {}",
                ts.to_iso8601()
            )));
        }
        Ok(ts)
    }

    /// Render as ISO-8601 UTC with millisecond precision and `Z` suffix.
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Add a signed number of milliseconds.
    pub fn plus_millis(&self, millis: i64) -> Option<Self> {
        self.0.checked_add_signed(Duration::milliseconds(millis)).map(Self)
    }

    /// Add a signed number of seconds.
    pub fn plus_secs(&self, secs: i64) -> Option<Self> {
        self.plus_millis(secs.checked_mul(1000)?)
    }

    /// The underlying chrono value.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.to_iso8601())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let digest = Digest::from_bytes([0x42; 32]);
        let hex = digest.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Digest::from_hex(&hex).unwrap(), digest);
    }

    #[test]
    fn test_digest_rejects_uppercase_and_short() {
        assert!(Digest::from_hex(&"A".repeat(64)).is_err());
        assert!(Digest::from_hex(&"a".repeat(63)).is_err());
        assert!(Digest::from_hex(&"g".repeat(64)).is_err());
    }

    #[test]
    fn test_genesis_is_all_zero_hex() {
        assert_eq!(Digest::GENESIS.to_hex(), "0".repeat(64));
        assert!(Digest::GENESIS.is_genesis());
    }

    #[test]
    fn test_digest_debug() {
        let digest = Digest::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", digest), "Digest(cdcdcdcdcdcdcdcd)");
    }

    #[test]
    fn test_timestamp_canonical_rendering() {
        let ts = Timestamp::from_millis(1_767_225_600_000).unwrap();
        assert_eq!(ts.to_iso8601(), "2026-01-01T00:00:00.000Z");
        assert_eq!(Timestamp::parse("2026-01-01T00:00:00.000Z").unwrap(), ts);
    }

    #[test]
    fn test_timestamp_rejects_non_canonical() {
        assert!(Timestamp::parse("2026-01-01T00:00:00Z").is_err());
        assert!(Timestamp::parse("2026-01-01T01:00:00.000+01:00").is_err());
        assert!(Timestamp::parse("not a time").is_err());
    }

    #[test]
    fn test_timestamp_serde() {
        let ts = Timestamp::from_millis(1_767_225_600_123).unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-01-01T00:00:00.123Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_millis(1_000).unwrap();
        assert_eq!(ts.plus_secs(1).unwrap().as_millis(), 2_000);
        assert_eq!(ts.plus_millis(-1).unwrap().as_millis(), 999);
    }

    proptest::proptest! {
        #[test]
        fn rendering_preserves_order(a in 0i64..253_402_300_799_999, b in 0i64..253_402_300_799_999) {
            let (ta, tb) = (Timestamp::from_millis(a).unwrap(), Timestamp::from_millis(b).unwrap());
            let (ra, rb) = (ta.to_iso8601(), tb.to_iso8601());
            proptest::prop_assert_eq!(ra.len(), 24);
            proptest::prop_assert_eq!(ra.cmp(&rb), a.cmp(&b));
            proptest::prop_assert_eq!(Timestamp::parse(&ra).unwrap(), ta);
        }
    }
}
