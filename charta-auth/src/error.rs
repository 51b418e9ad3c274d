// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::cbor::{DecodeError, EncodeError};
use charta_core::{DocumentId, InstanceId};
use charta_ledger::LedgerError;
use thiserror::Error;

use crate::document::DocumentError;

/// Errors of the authorization workflow.
///
/// Every operation either succeeds or returns one of these; nothing is
/// recovered or retried internally. In particular a failed execution is never
/// retried by this layer, since a premature retry could race with another
/// actor's concurrent signature; callers re-invoke `execute` once more
/// signatures have arrived.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The caller's identity does not satisfy the rule governing the
    /// attempted action.
    #[error("caller is not authorized for the attempted action")]
    RuleViolation,

    /// No staged transaction is stored under the given identifier.
    #[error("staged transaction {0} not found")]
    UnknownTransaction(InstanceId),

    /// No document is stored under the given base identifier.
    #[error("document {0} not found")]
    UnknownDocument(DocumentId),

    /// The querier has no grants on the given project.
    #[error("querier \"{0}\" has no grants on this project")]
    UnknownQuerier(String),

    /// This identity already signed the selected slot.
    #[error("identity already signed this slot")]
    AlreadySigned,

    /// The staged transaction was already committed.
    #[error("staged transaction was already executed")]
    AlreadyExecuted,

    /// The collected signatures do not satisfy the governing rule. Collected
    /// signatures are preserved; execution may be retried later.
    #[error("collected signatures do not satisfy the governing rule")]
    QuorumNotReached,

    /// The staged transaction's validity window has lapsed.
    #[error("staged transaction expired")]
    Expired,

    /// A blocking ledger call exceeded its caller-supplied window.
    #[error("ledger operation timed out")]
    Timeout,

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),

    /// Transport or consensus-layer failure, surfaced as-is. May be retried
    /// by the caller with backoff.
    #[error("ledger error: {0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for AuthError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Timeout => AuthError::Timeout,
            LedgerError::Expired => AuthError::Expired,
            LedgerError::AlreadyExecuted => AuthError::AlreadyExecuted,
            LedgerError::DuplicateSignature => AuthError::AlreadySigned,
            LedgerError::Unauthorized => AuthError::RuleViolation,
            err => AuthError::Ledger(err),
        }
    }
}
