// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Versionstamps
//!
//! A versionstamp is the position the sequencer assigned to a command in its global order. On
//! the wire it is an opaque base64 token; this module decodes it into raw bytes and compares two
//! stamps as unsigned big-endian integers.
//!
//! Stamps are not fixed-width. A 3-byte stamp and a 12-byte stamp are compared by left-padding
//! the shorter one with zero bytes and then comparing byte by byte, so `00 02 0a` is newer than
//! `00 .. 00 01 0a` even though it is shorter.
//!
//! A command that has not been sequenced yet (a local, optimistic write) has no stamp at all.
//! Such an absent stamp is older than every concrete stamp, see [`is_older`].
use base64::{
    Engine, alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
use smallvec::SmallVec;
use std::{cmp::Ordering, fmt, iter, str::FromStr};

// Tokens arrive both with and without trailing `=`.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Error returned when a versionstamp token cannot be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VersionstampError {
    /// The token is not valid base64.
    #[error("versionstamp token {token:?} is not valid base64")]
    Decode {
        /// The offending token.
        token: String,
    },
}

/// A decoded, server-issued versionstamp.
///
/// Equality and ordering follow the padded big-endian comparison described in the module docs,
/// which means `[0x00, 0x01]` and `[0x01]` are equal.
#[derive(Clone)]
pub struct Versionstamp {
    // most stamps issued by the sequencer are 10 bytes
    bytes: SmallVec<[u8; 12]>,
    token: String,
}

impl Versionstamp {
    /// Decodes a base64 token.
    ///
    /// # Errors
    ///
    /// Returns an error if `token` is not valid base64.
    pub fn from_token(token: &str) -> Result<Self, VersionstampError> {
        let bytes = TOKEN_ENGINE
            .decode(token)
            .map_err(|_| VersionstampError::Decode {
                token: token.to_string(),
            })?;
        Ok(Self {
            bytes: SmallVec::from_vec(bytes),
            token: token.to_string(),
        })
    }

    /// Decodes a token that may be empty.
    ///
    /// Checkpoints of documents that were never written carry an empty `vs`, which stands for an
    /// absent stamp rather than a zero-length one.
    pub fn from_optional_token(token: &str) -> Result<Option<Self>, VersionstampError> {
        if token.is_empty() {
            return Ok(None);
        }
        Self::from_token(token).map(Some)
    }

    /// Creates a versionstamp from raw bytes.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let bytes = bytes.as_ref();
        Self {
            bytes: SmallVec::from_slice(bytes),
            token: TOKEN_ENGINE.encode(bytes),
        }
    }

    /// Returns the decoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the token this stamp was decoded from.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns true if `self` is strictly older than `other`.
    pub fn is_older_than(&self, other: &Versionstamp) -> bool {
        self < other
    }
}

/// Returns true if `older` is strictly older than `newer`.
///
/// An absent stamp never wins: it is older than any concrete stamp, and also "older" than another
/// absent stamp. Callers break that tie themselves.
pub fn is_older(older: Option<&Versionstamp>, newer: Option<&Versionstamp>) -> bool {
    match (older, newer) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(older), Some(newer)) => older.is_older_than(newer),
    }
}

/// Like [`is_older`], but on raw tokens. The empty token is an absent stamp.
///
/// # Errors
///
/// Returns an error if either token is not valid base64.
pub fn is_older_token(older: &str, newer: &str) -> Result<bool, VersionstampError> {
    let older = Versionstamp::from_optional_token(older)?;
    let newer = Versionstamp::from_optional_token(newer)?;
    Ok(is_older(older.as_ref(), newer.as_ref()))
}

fn cmp_padded(left: &[u8], right: &[u8]) -> Ordering {
    let width = left.len().max(right.len());
    let left = iter::repeat_n(0u8, width - left.len()).chain(left.iter().copied());
    let right = iter::repeat_n(0u8, width - right.len()).chain(right.iter().copied());
    left.cmp(right)
}

impl PartialEq for Versionstamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Versionstamp {}

impl PartialOrd for Versionstamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Versionstamp {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_padded(&self.bytes, &other.bytes)
    }
}

impl fmt::Debug for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vs(")?;
        for byte in &self.bytes {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl FromStr for Versionstamp {
    type Err = VersionstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_token(s)
    }
}

#[cfg(feature = "serde")]
impl ::serde::Serialize for Versionstamp {
    fn serialize<S: ::serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token)
    }
}

#[cfg(feature = "serde")]
impl<'de> ::serde::Deserialize<'de> for Versionstamp {
    fn deserialize<D: ::serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::from_token(&token).map_err(::serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vs(token: &str) -> Versionstamp {
        token.parse().unwrap()
    }

    #[test]
    fn sequencer_stamps_compare_in_issue_order() {
        let pairs = [
            ("AAAAOO4jk5UAAA==", "AAAAOTKy5nUAAA=="),
            ("AAAAOTKy5nUAAA==", "AAAAOW+nMK8AAA=="),
        ];
        for (older, newer) in pairs {
            assert!(vs(older).is_older_than(&vs(newer)));
            assert!(!vs(newer).is_older_than(&vs(older)));
        }
    }

    #[test]
    fn zero_is_older_than_one() {
        let zero = vs("AAAAAAAAAAAAAAo=");
        let one = vs("AAAAAAAAAAAAAQo=");
        assert!(zero.is_older_than(&one));
        assert!(!one.is_older_than(&zero));
    }

    #[test]
    fn short_stamps_are_left_padded() {
        let one = vs("AAAAAAAAAAAAAQo=");
        // 00 00 0a
        let zero_zero = vs("AAAK");
        // 00 02 0a
        let zero_two = vs("AAIK");

        assert_eq!(zero_zero.as_bytes(), &[0x00, 0x00, 0x0a]);
        assert!(zero_zero.is_older_than(&one));
        assert!(!one.is_older_than(&zero_zero));
        assert!(one.is_older_than(&zero_two));
        assert!(!zero_two.is_older_than(&one));
    }

    #[test]
    fn absent_stamps_never_win() {
        let one = vs("MQ==");
        assert!(is_older(None, Some(&one)));
        assert!(!is_older(Some(&one), None));
        assert!(is_older(None, None));
        assert!(!is_older(Some(&one), Some(&one)));
    }

    #[test]
    fn padding_is_optional() {
        assert_eq!(vs("MQ"), vs("MQ=="));
        assert_eq!(vs("MQ").token(), "MQ");
    }

    #[test]
    fn tokens_at_the_boundary() {
        assert_eq!(is_older_token("", "MQ=="), Ok(true));
        assert_eq!(is_older_token("Mg==", "MQ=="), Ok(false));
        assert!(matches!(
            is_older_token("not base64!", "MQ=="),
            Err(VersionstampError::Decode { .. })
        ));
    }

    #[test]
    fn from_bytes_encodes_a_padded_token() {
        let stamp = Versionstamp::from_bytes([0x00, 0x00, 0x0a]);
        assert_eq!(stamp.token(), "AAAK");
        assert_eq!(stamp, vs("AAAK"));
        assert_eq!(format!("{stamp:?}"), "vs(00000a)");
    }

    #[quickcheck]
    fn never_older_than_itself(stamp: Versionstamp) -> bool {
        !stamp.is_older_than(&stamp)
    }

    #[quickcheck]
    fn leading_zeroes_do_not_change_magnitude(bytes: Vec<u8>, zeroes: u8) -> bool {
        let mut padded = vec![0; usize::from(zeroes % 8)];
        padded.extend_from_slice(&bytes);
        Versionstamp::from_bytes(&bytes) == Versionstamp::from_bytes(padded)
    }

    #[quickcheck]
    fn agrees_with_integer_order(left: u64, right: u64) -> bool {
        // strip leading zeroes so the two stamps usually differ in length
        let encode = |n: u64| {
            let bytes = n.to_be_bytes();
            let first = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
            Versionstamp::from_bytes(&bytes[first..])
        };
        encode(left).is_older_than(&encode(right)) == (left < right)
    }

    #[quickcheck]
    fn exactly_one_direction_is_older(left: Versionstamp, right: Versionstamp) -> bool {
        let older = left.is_older_than(&right);
        let newer = right.is_older_than(&left);
        match left.cmp(&right) {
            Ordering::Equal => !older && !newer,
            _ => older ^ newer,
        }
    }
}
