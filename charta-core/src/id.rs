// SPDX-License-Identifier: MIT OR Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serde::{deserialize_hex, serialize_hex};

/// Size of derived identifiers in bytes.
pub const ID_LEN: usize = blake3::OUT_LEN;

/// Identifier of a single ledger instance (a document version scope, a staged
/// transaction or an access-right record).
///
/// Instance identifiers are derived deterministically with BLAKE3 from the
/// instruction which created the instance, so every actor can compute them
/// locally without a ledger round-trip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId([u8; ID_LEN]);

impl InstanceId {
    /// Derive an identifier from the given bytes.
    pub fn derive(buf: impl AsRef<[u8]>) -> Self {
        Self(*blake3::hash(buf.as_ref()).as_bytes())
    }

    /// Construct an identifier from its raw bytes representation.
    pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Hex string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for InstanceId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for InstanceId {
    type Error = IdError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let value_len = value.len();
        let checked: [u8; ID_LEN] = value
            .try_into()
            .map_err(|_| IdError::InvalidLength(value_len, ID_LEN))?;
        Ok(Self(checked))
    }
}

impl FromStr for InstanceId {
    type Err = IdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::try_from(hex::decode(value)?.as_slice())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.to_hex())
    }
}

impl Serialize for InstanceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serialize_hex(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for InstanceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = deserialize_hex(deserializer)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|err: IdError| serde::de::Error::custom(err.to_string()))
    }
}

/// Base identifier of an authorization document.
///
/// Assigned when the document is spawned and stable for the document's whole
/// lifetime, while the document itself evolves version by version in place.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(InstanceId);

impl DocumentId {
    /// Identifier of the ledger instance holding the current document version.
    ///
    /// Documents evolve in place, so the instance identifier equals the base
    /// identifier for every version.
    pub fn instance(&self) -> InstanceId {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<InstanceId> for DocumentId {
    fn from(value: InstanceId) -> Self {
        Self(value)
    }
}

impl AsRef<[u8]> for DocumentId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl FromStr for DocumentId {
    type Err = IdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(value.parse()?))
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.to_hex())
    }
}

/// Error types for identifier parsing.
#[derive(Error, Debug)]
pub enum IdError {
    /// Identifier has an invalid length.
    #[error("invalid identifier length {0} bytes, expected {1} bytes")]
    InvalidLength(usize, usize),

    /// Identifier string contains invalid hexadecimal characters.
    #[error("invalid hex encoding in identifier string")]
    InvalidHexEncoding(#[from] hex::FromHexError),
}
