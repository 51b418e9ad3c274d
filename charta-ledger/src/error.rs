// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::InstanceId;
use thiserror::Error;

/// Errors reported by a ledger implementation.
///
/// All of these are surfaced to the caller; the workflow never retries a
/// failed submission on its own.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Transport or consensus-layer failure.
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    /// A blocking call exceeded its caller-supplied window.
    #[error("ledger operation timed out")]
    Timeout,

    /// No instance is stored under the given identifier.
    #[error("unknown instance {0}")]
    UnknownInstance(InstanceId),

    /// No instance is bound under the given well-known name.
    #[error("no instance bound under name \"{0}\"")]
    UnknownName(String),

    /// A signer counter does not continue that identity's submission sequence.
    #[error("invalid signer counter {got}, expected {expected}")]
    InvalidCounter { expected: u64, got: u64 },

    /// A transaction signature does not verify against the instruction digest.
    #[error("invalid transaction signature")]
    InvalidSignature,

    /// The submitting identities do not satisfy the governing rule.
    #[error("submission does not satisfy the governing rule")]
    Unauthorized,

    /// The staged transaction was already committed.
    #[error("staged transaction was already executed")]
    AlreadyExecuted,

    /// The staged transaction's validity window has lapsed.
    #[error("staged transaction expired")]
    Expired,

    /// The identity already signed this slot of the staged transaction.
    #[error("duplicate signature for this slot")]
    DuplicateSignature,

    /// The ledger rejected the submission for another reason.
    #[error("submission rejected: {0}")]
    Rejected(String),
}
