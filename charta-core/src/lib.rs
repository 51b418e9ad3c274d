// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core data types for charta: signing identities, derived identifiers and the
//! CBOR encoding shared by everything that crosses the ledger boundary.
pub mod cbor;
mod id;
mod identity;
pub mod serde;

pub use id::{DocumentId, ID_LEN, IdError, InstanceId};
pub use identity::{IdentityError, PrivateKey, PublicKey, Signature};
