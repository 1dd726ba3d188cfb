use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{rngs::OsRng, RngCore};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

const LABEL_DOMAIN: &[u8] = b"fairlaunch-address";

/// Opaque 32-byte account identifier. The all-zero value is the null address.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 32]);

impl Address {
    pub const ZERO: Address = Address([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministic address for a human readable label (`@alice` in scenarios).
    pub fn from_label(label: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(LABEL_DOMAIN);
        hasher.update(label.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form keeps event dumps readable
        write!(f, "Address({}..)", &self.to_hex()[..8])
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("empty address label")]
    EmptyLabel,
    #[error("invalid address hex: {0}")]
    InvalidHex(String),
    #[error("address must be 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(label) = s.strip_prefix('@') {
            if label.is_empty() {
                return Err(AddressParseError::EmptyLabel);
            }
            return Ok(Self::from_label(label));
        }
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(digits).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.parse().map_err(D::Error::custom)
    }
}

/// Fresh ed25519 key and the address it controls.
pub fn generate_keypair() -> (SigningKey, Address) {
    let mut sk_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut sk_bytes);
    let sk = SigningKey::from_bytes(&sk_bytes);
    let address = Address::from_verifying_key(&sk.verifying_key());
    (sk, address)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_addresses_are_stable_and_distinct() {
        let alice = Address::from_label("alice");
        assert_eq!(alice, Address::from_label("alice"));
        assert_ne!(alice, Address::from_label("bob"));
        assert!(!alice.is_null());
    }

    #[test]
    fn parses_hex_prefixed_hex_and_labels() {
        let alice = Address::from_label("alice");
        let hex_form = alice.to_hex();
        assert_eq!(hex_form.parse::<Address>().unwrap(), alice);
        assert_eq!(format!("0x{hex_form}").parse::<Address>().unwrap(), alice);
        assert_eq!("@alice".parse::<Address>().unwrap(), alice);
        assert_eq!("@".parse::<Address>(), Err(AddressParseError::EmptyLabel));
        assert_eq!(
            "abcd".parse::<Address>(),
            Err(AddressParseError::InvalidLength(2))
        );
        assert!(matches!(
            "zz".parse::<Address>(),
            Err(AddressParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_hex_text_and_accepts_labels() {
        let alice = Address::from_label("alice");
        let json = serde_json::to_string(&alice).unwrap();
        assert_eq!(json, format!("\"{}\"", alice.to_hex()));
        let back: Address = serde_json::from_str("\"@alice\"").unwrap();
        assert_eq!(back, alice);
    }

    #[test]
    fn keypair_address_matches_public_key() {
        let (sk, address) = generate_keypair();
        assert_eq!(address.as_bytes(), sk.verifying_key().as_bytes());
        assert!(Address::ZERO.is_null());
    }
}
