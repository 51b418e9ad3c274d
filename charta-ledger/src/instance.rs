// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::cbor::{DecodeError, decode_cbor};
use charta_core::serde::{deserialize_hex, serialize_hex};
use charta_core::{DocumentId, InstanceId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Envelope around one stored ledger instance, as returned by random reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,

    /// Name of the contract this instance belongs to.
    pub contract: String,

    /// Base identifier of the document governing this instance.
    pub scope: DocumentId,

    /// Number of committed mutations of this instance.
    pub version: u64,

    /// CBOR-encoded contract state.
    #[serde(serialize_with = "serialize_hex", deserialize_with = "deserialize_hex")]
    pub data: Vec<u8>,
}

impl Instance {
    /// Decode the contract state into its typed representation.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        decode_cbor(self.data.as_slice())
    }
}
