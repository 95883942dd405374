//! The at-rest record schema shared across producers and consumers.
//!
//! Defines [`Record`], the unit of storage persisted by the inserter and
//! read back by the reader, plus the reduced projections the reclaimer and
//! denylist refresher operate on: [`RecordToDelete`] and [`DenylistedItem`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Enumerated event kind, encoded as a small non-negative integer that is
/// stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    /// A generic payload event.
    Default = 0,
    /// An online/offline lifecycle state transition.
    State = 1,
}

impl RecordType {
    /// Returns the stable wire tag for this variant.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RecordType {
    type Error = InvalidRecordType;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Default),
            1 => Ok(Self::State),
            other => Err(InvalidRecordType(other)),
        }
    }
}

/// A record type tag did not match any known [`RecordType`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown record type tag {0}")]
pub struct InvalidRecordType(pub u8);

/// Algorithm tag stored alongside a record's ciphertext, identifying which
/// decrypt strategy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgTag {
    /// Ciphertext equals plaintext; no cryptographic operation was applied.
    None,
    /// Authenticated NaCl-style sealed box.
    Box,
    /// RSA-OAEP, symmetric variant (no sender signature).
    RsaSym,
    /// RSA-OAEP, asymmetric variant (sender PSS signature in `nonce`).
    RsaAsy,
}

impl AlgTag {
    const NONE: &'static str = "none";
    const BOX: &'static str = "box";
    const RSA_SYM: &'static str = "rsa-sym";
    const RSA_ASY: &'static str = "rsa-asy";

    /// Returns the canonical lowercase wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => Self::NONE,
            Self::Box => Self::BOX,
            Self::RsaSym => Self::RSA_SYM,
            Self::RsaAsy => Self::RSA_ASY,
        }
    }
}

impl fmt::Display for AlgTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgTag {
    type Err = InvalidAlgTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            Self::NONE => Ok(Self::None),
            Self::BOX => Ok(Self::Box),
            Self::RSA_SYM => Ok(Self::RsaSym),
            Self::RSA_ASY => Ok(Self::RsaAsy),
            _ => Err(InvalidAlgTag(s.to_string())),
        }
    }
}

/// An algorithm tag string did not match any known [`AlgTag`] variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown algorithm tag {0:?}")]
pub struct InvalidAlgTag(pub String);

/// Hash tag used to select the digest function for RSA-OAEP and PSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashTag {
    /// BLAKE2b-512. Default and recommended.
    Blake2b512,
    /// SHA-1. Legacy, discouraged.
    Sha1,
    /// SHA-512.
    Sha512,
    /// MD5. Legacy, discouraged.
    Md5,
}

impl HashTag {
    const BLAKE2B512: &'static str = "BLAKE2B512";
    const SHA1: &'static str = "SHA1";
    const SHA512: &'static str = "SHA512";
    const MD5: &'static str = "MD5";
}

impl Default for HashTag {
    fn default() -> Self {
        Self::Blake2b512
    }
}

impl fmt::Display for HashTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Blake2b512 => Self::BLAKE2B512,
            Self::Sha1 => Self::SHA1,
            Self::Sha512 => Self::SHA512,
            Self::Md5 => Self::MD5,
        };
        f.write_str(s)
    }
}

impl FromStr for HashTag {
    type Err = InvalidHashTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            Self::BLAKE2B512 => Ok(Self::Blake2b512),
            Self::SHA1 => Ok(Self::Sha1),
            Self::SHA512 => Ok(Self::Sha512),
            Self::MD5 => Ok(Self::Md5),
            _ => Err(InvalidHashTag(s.to_string())),
        }
    }
}

/// A hash tag string did not match any known [`HashTag`] variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hash tag {0:?}")]
pub struct InvalidHashTag(pub String);

/// The unit of storage: a device lifecycle or payload event.
///
/// Rows are immutable after insert; updates are modelled as new records,
/// not in-place mutation. `record_id` and `shard` are used only by the
/// reclaimer to identify rows for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Enumerated event kind.
    pub r#type: RecordType,
    /// Opaque lower-cased device identifier. Never empty.
    pub device_id: String,
    /// Origin time, nanoseconds since the Unix epoch.
    pub birth_date: i64,
    /// Expiry time, nanoseconds since the Unix epoch. The record is eligible
    /// for deletion once wall time reaches or passes this value.
    pub death_date: i64,
    /// Ciphertext of the encoded event envelope.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Per-record cryptographic nonce or signature; contents depend on `alg`.
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
    /// Algorithm tag identifying the cipher used for `data`/`nonce`.
    pub alg: AlgTag,
    /// Key identifier selecting the matching decrypt key at the reader.
    pub kid: String,
    /// Row identifier, unique within `(shard, death_date)`.
    pub record_id: i64,
    /// Coarse partition key for parallelizing reclamation.
    pub shard: i32,
}

impl Record {
    /// Returns `true` if the record violates one of the invariants from the
    /// data model: `birth_date <= death_date` and a non-empty `device_id`.
    ///
    /// Callers (principally the batched writer) use this to reject malformed
    /// records before they reach the driver.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.birth_date <= self.death_date && !self.device_id.is_empty()
    }

    /// Returns `true` if `data` is empty. Empty-payload records are a
    /// silent no-op for the batched writer.
    #[must_use]
    pub fn has_empty_payload(&self) -> bool {
        self.data.is_empty()
    }

    /// Projects this record down to the triple the reclaimer needs.
    #[must_use]
    pub fn to_delete_key(&self) -> RecordToDelete {
        RecordToDelete {
            shard: self.shard,
            death_date: self.death_date,
            record_id: self.record_id,
        }
    }
}

/// The reclaimer's reduced projection of a [`Record`]: just enough to
/// identify and delete a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordToDelete {
    /// Coarse partition key.
    pub shard: i32,
    /// Expiry time, nanoseconds since epoch.
    pub death_date: i64,
    /// Row identifier, unique within `(shard, death_date)`.
    pub record_id: i64,
}

/// A denylist entry: a device identifier pattern (literal or regular
/// expression) paired with a free-text diagnostic reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenylistedItem {
    /// Literal device identifier or regular-expression pattern.
    pub id: String,
    /// Free-text diagnostic surfaced to callers who are denied service.
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_round_trips_through_tag() {
        for variant in [RecordType::Default, RecordType::State] {
            assert_eq!(RecordType::try_from(variant.tag()).unwrap(), variant);
        }
    }

    #[test]
    fn record_type_rejects_unknown_tag() {
        assert_eq!(RecordType::try_from(7).unwrap_err(), InvalidRecordType(7));
    }

    #[test]
    fn alg_tag_display_and_parse_round_trip() {
        for variant in [AlgTag::None, AlgTag::Box, AlgTag::RsaSym, AlgTag::RsaAsy] {
            let s = variant.to_string();
            assert_eq!(s.parse::<AlgTag>().unwrap(), variant);
        }
    }

    #[test]
    fn alg_tag_parse_is_case_insensitive() {
        assert_eq!("RSA-ASY".parse::<AlgTag>().unwrap(), AlgTag::RsaAsy);
        assert_eq!("Box".parse::<AlgTag>().unwrap(), AlgTag::Box);
    }

    #[test]
    fn hash_tag_default_is_blake2b512() {
        assert_eq!(HashTag::default(), HashTag::Blake2b512);
    }

    #[test]
    fn hash_tag_parse_is_case_insensitive() {
        assert_eq!("blake2b512".parse::<HashTag>().unwrap(), HashTag::Blake2b512);
        assert_eq!("Sha512".parse::<HashTag>().unwrap(), HashTag::Sha512);
    }

    #[test]
    fn hash_tag_rejects_unknown() {
        assert!("sha3".parse::<HashTag>().is_err());
    }

    fn sample_record() -> Record {
        Record {
            r#type: RecordType::Default,
            device_id: "abc123".to_string(),
            birth_date: 1_000,
            death_date: 2_000,
            data: vec![1, 2, 3],
            nonce: vec![],
            alg: AlgTag::None,
            kid: String::new(),
            record_id: 42,
            shard: 0,
        }
    }

    #[test]
    fn well_formed_record_passes() {
        assert!(sample_record().is_well_formed());
    }

    #[test]
    fn birth_after_death_is_not_well_formed() {
        let mut r = sample_record();
        r.birth_date = 5_000;
        assert!(!r.is_well_formed());
    }

    #[test]
    fn empty_device_id_is_not_well_formed() {
        let mut r = sample_record();
        r.device_id.clear();
        assert!(!r.is_well_formed());
    }

    #[test]
    fn empty_payload_is_detected() {
        let mut r = sample_record();
        r.data.clear();
        assert!(r.has_empty_payload());
    }

    #[test]
    fn to_delete_key_projects_triple() {
        let r = sample_record();
        let key = r.to_delete_key();
        assert_eq!(key, RecordToDelete { shard: 0, death_date: 2_000, record_id: 42 });
    }

    #[test]
    fn record_serde_round_trip() {
        let r = sample_record();
        let json = serde_json::to_string(&r).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
