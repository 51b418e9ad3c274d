// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serde::{deserialize_hex, serialize_hex};

/// Size of ed25519 private keys.
pub const PRIVATE_KEY_LEN: usize = ed25519_dalek::SECRET_KEY_LENGTH;

/// Size of ed25519 public keys.
pub const PUBLIC_KEY_LEN: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;

/// Size of ed25519 signatures.
pub const SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Private ed25519 key used for signing instructions and staged-transaction
/// digests.
#[derive(Clone, Debug)]
pub struct PrivateKey(SigningKey);

impl PrivateKey {
    /// Generates a new private key using the system's CSPRNG as a seed.
    pub fn new() -> Self {
        let mut csprng = OsRng;
        Self(SigningKey::generate(&mut csprng))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; PRIVATE_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), PRIVATE_KEY_LEN))?;
        Ok(Self(SigningKey::from_bytes(&checked)))
    }

    pub fn as_bytes(&self) -> &[u8; PRIVATE_KEY_LEN] {
        self.0.as_bytes()
    }

    /// Public counterpart of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key())
    }

    /// Sign the given bytes.
    pub fn sign(&self, bytes: &[u8]) -> Signature {
        Signature(self.0.sign(bytes))
    }
}

impl Default for PrivateKey {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for PrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Public ed25519 key identifying a signer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(VerifyingKey);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; PUBLIC_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), PUBLIC_KEY_LEN))?;
        let key =
            VerifyingKey::from_bytes(&checked).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Verify a signature over the given bytes against this key.
    pub fn verify(&self, bytes: &[u8], signature: &Signature) -> bool {
        self.0.verify_strict(bytes, &signature.0).is_ok()
    }
}

impl PartialOrd for PublicKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PublicKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl FromStr for PublicKey {
    type Err = IdentityError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(&hex::decode(value)?)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(self.as_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(ed25519_dalek::Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let checked: [u8; SIGNATURE_LEN] = bytes
            .try_into()
            .map_err(|_| IdentityError::InvalidLength(bytes.len(), SIGNATURE_LEN))?;
        Ok(Self(ed25519_dalek::Signature::from_bytes(&checked)))
    }

    pub fn to_bytes(&self) -> [u8; SIGNATURE_LEN] {
        self.0.to_bytes()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.to_bytes()))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        Self::from_bytes(&bytes).map_err(|err| serde::de::Error::custom(err.to_string()))
    }
}

/// Error types for key and signature handling.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Key or signature material has an invalid length.
    #[error("invalid length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Bytes do not describe a valid curve point.
    #[error("invalid public key bytes")]
    InvalidPublicKey,

    /// String contains invalid hexadecimal characters.
    #[error("invalid hex encoding in key string")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::{PrivateKey, PublicKey, Signature};

    #[test]
    fn sign_and_verify() {
        let private_key = PrivateKey::new();
        let signature = private_key.sign(b"staged transaction digest");
        assert!(
            private_key
                .public_key()
                .verify(b"staged transaction digest", &signature)
        );
        assert!(
            !private_key
                .public_key()
                .verify(b"different payload", &signature)
        );
    }

    #[test]
    fn foreign_key_does_not_verify() {
        let private_key = PrivateKey::new();
        let other = PrivateKey::new();
        let signature = private_key.sign(b"payload");
        assert!(!other.public_key().verify(b"payload", &signature));
    }

    #[test]
    fn key_bytes_roundtrip() {
        let private_key = PrivateKey::new();
        let restored = PrivateKey::from_bytes(private_key.as_bytes()).unwrap();
        assert_eq!(restored.public_key(), private_key.public_key());

        let public_key = private_key.public_key();
        let restored = PublicKey::from_bytes(public_key.as_bytes()).unwrap();
        assert_eq!(restored, public_key);
    }

    #[test]
    fn serde_roundtrip() {
        let private_key = PrivateKey::new();
        let signature = private_key.sign(b"payload");

        let json = serde_json::to_string(&private_key.public_key()).unwrap();
        let public_key: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(public_key, private_key.public_key());

        let mut bytes: Vec<u8> = Vec::new();
        ciborium::ser::into_writer(&signature, &mut bytes).unwrap();
        let signature_again: Signature = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(signature, signature_again);
    }
}
