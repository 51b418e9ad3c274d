// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers to (de)serialize byte sequences as hex strings in human-readable
//! encodings (JSON) while keeping raw bytes in binary encodings (CBOR).
use serde::Serialize;
use serde_bytes::{ByteBuf as SerdeByteBuf, Bytes as SerdeBytes};

/// Serialize bytes into a hex string for human-readable encodings, otherwise
/// serialize the bytes directly.
pub fn serialize_hex<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    if serializer.is_human_readable() {
        hex::serde::serialize(value, serializer)
    } else {
        SerdeBytes::new(value).serialize(serializer)
    }
}

/// Deserialize bytes from a hex string for human-readable encodings, otherwise
/// deserialize the bytes directly.
pub fn deserialize_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    if deserializer.is_human_readable() {
        hex::serde::deserialize(deserializer)
    } else {
        let bytes = <SerdeByteBuf as serde::Deserialize>::deserialize(deserializer)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{deserialize_hex, serialize_hex};

    #[derive(Debug, Serialize, Deserialize)]
    struct Wrapper(
        #[serde(serialize_with = "serialize_hex", deserialize_with = "deserialize_hex")] Vec<u8>,
    );

    #[test]
    fn cbor_keeps_raw_bytes() {
        let mut bytes: Vec<u8> = Vec::new();
        ciborium::ser::into_writer(&Wrapper(vec![1, 2, 3]), &mut bytes).unwrap();
        assert_eq!(bytes, vec![67, 1, 2, 3]);

        let wrapper: Wrapper = ciborium::de::from_reader(&bytes[..]).unwrap();
        assert_eq!(wrapper.0, vec![1, 2, 3]);
    }

    #[test]
    fn json_uses_hex() {
        let json = serde_json::to_string(&Wrapper(vec![0xca, 0xfe])).unwrap();
        assert_eq!(json, "\"cafe\"");

        let wrapper: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(wrapper.0, vec![0xca, 0xfe]);
    }
}
