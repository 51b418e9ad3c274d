// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hierarchical, threshold-signed authorization over an external ledger.
//!
//! Actors jointly own authorization documents: versioned, self-governing
//! signer sets with per-action rule expressions. Every state-changing
//! operation on a document is proposed as a staged transaction which must
//! collect a quorum of signatures from the document's current signer set
//! before any actor may execute it. Fine-grained access rights are attached to
//! project documents and evaluated with direct ledger reads.
//!
//! Actors coordinate exclusively through the ledger: signature collection is
//! order-independent across independent sessions and quorum is re-checked
//! against fresh ledger state on every execution attempt.
mod access;
mod coordinator;
mod document;
mod error;
mod expression;
mod session;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;
#[cfg(test)]
mod tests;

pub use access::{ACCESS_RIGHT_NAME, AccessRight, AccessRightError};
pub use coordinator::{Coordinator, governing_action};
pub use document::{
    ACTION_BIND, ACTION_EVOLVE, ACTION_SIGN, ACTION_SPAWN_ACCESS_RIGHT, ACTION_SPAWN_DOCUMENT,
    ACTION_SPAWN_STAGED, ACTION_UPDATE, Document, DocumentError, Policy, Rules, Signer,
};
pub use error::AuthError;
pub use expression::Expression;
pub use session::{DEFAULT_EXPIRY_ROUNDS, Session};
