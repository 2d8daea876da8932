//! Hash types (H256)

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Hash parsing error
#[derive(Debug, Error)]
pub enum HashError {
    /// Invalid hex string
    #[error("invalid hex string: {0}")]
    InvalidHex(String),
    /// Invalid length
    #[error("invalid hash length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },
}

/// 256-bit hash (32 bytes)
///
/// Ordered lexicographically over its bytes so it can serve as a
/// deterministic tie-break key in sorted containers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct H256([u8; 32]);

/// Alias for H256
pub type Hash = H256;

impl H256 {
    /// Size in bytes
    pub const LEN: usize = 32;

    /// Zero hash
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Create from bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }

    /// Create from slice
    pub fn from_slice(slice: &[u8]) -> Result<Self, HashError> {
        if slice.len() != 32 {
            return Err(HashError::InvalidLength {
                expected: 32,
                got: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(H256(bytes))
    }

    /// Parse from hex string (with or without 0x prefix)
    pub fn from_hex(s: &str) -> Result<Self, HashError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Convert to hex string with 0x prefix
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

// Hex-string serde representation, matching Display.
impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Basic tests ====================

    #[test]
    fn test_h256_from_hex() {
        let hash = H256::from_hex(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert!(!hash.is_zero());
        assert_eq!(hash.as_bytes()[31], 1);
    }

    #[test]
    fn test_h256_zero() {
        assert!(H256::ZERO.is_zero());
        assert_eq!(H256::default(), H256::ZERO);
    }

    #[test]
    fn test_h256_from_hex_without_prefix() {
        let hash = H256::from_hex(
            "0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap();
        assert!(!hash.is_zero());
    }

    #[test]
    fn test_h256_hex_roundtrip() {
        let original = "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789";
        let hash = H256::from_hex(original).unwrap();
        assert_eq!(hash.to_hex(), original);
    }

    // ==================== Error tests ====================

    #[test]
    fn test_h256_from_hex_invalid_chars() {
        let result = H256::from_hex(
            "0xgggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggggg",
        );
        match result {
            Err(HashError::InvalidHex(_)) => {}
            other => panic!("Expected InvalidHex error, got {:?}", other),
        }
    }

    #[test]
    fn test_h256_from_hex_wrong_length() {
        // 31 bytes
        let result = H256::from_hex(
            "0x00000000000000000000000000000000000000000000000000000000000001",
        );
        match result {
            Err(HashError::InvalidLength { expected: 32, got: 31 }) => {}
            other => panic!("Expected InvalidLength, got {:?}", other),
        }
    }

    #[test]
    fn test_h256_from_slice_wrong_length() {
        assert!(H256::from_slice(&[0u8; 31]).is_err());
        assert!(H256::from_slice(&[0u8; 33]).is_err());
        assert!(H256::from_slice(&[]).is_err());
        assert!(H256::from_slice(&[0xab; 32]).is_ok());
    }

    // ==================== Ordering tests ====================

    #[test]
    fn test_h256_ordering_is_bytewise() {
        let mut one = [0u8; 32];
        one[31] = 1;
        let mut big = [0u8; 32];
        big[0] = 1;
        assert!(H256::from_bytes(one) > H256::ZERO);
        assert!(H256::from_bytes(big) > H256::from_bytes(one));
    }

    // ==================== Display and Debug ====================

    #[test]
    fn test_h256_display_and_debug() {
        let hash = H256::from_hex(
            "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789",
        )
        .unwrap();
        assert_eq!(
            format!("{}", hash),
            "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789"
        );
        assert!(format!("{:?}", hash).starts_with("H256(0x"));
    }

    // ==================== Serde tests ====================

    #[test]
    fn test_h256_serde_roundtrip() {
        let hash = H256::from_hex(
            "0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789",
        )
        .unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(
            json,
            "\"0xabcdef0123456789abcdef0123456789abcdef0123456789abcdef0123456789\""
        );
        let back: H256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_h256_serde_rejects_bad_input() {
        assert!(serde_json::from_str::<H256>("\"0x01\"").is_err());
        assert!(serde_json::from_str::<H256>("42").is_err());
    }
}
