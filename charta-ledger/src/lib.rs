// SPDX-License-Identifier: MIT OR Apache-2.0

//! Interface to the append-only ledger which stores authorization documents,
//! staged transactions and access-right records.
//!
//! The ledger itself (consensus, storage, transport) is an external
//! collaborator. This crate only defines what the authorization workflow
//! consumes from it: the instruction wire model, the staged-transaction
//! primitive and the [`Ledger`] trait with its error taxonomy.
pub mod contract;
mod error;
mod instance;
mod instruction;
mod staged;
mod traits;

pub use error::LedgerError;
pub use instance::Instance;
pub use instruction::{Argument, Instruction, Operation, Transaction, TransactionSignature};
pub use staged::{SignatureEntry, StagedState, StagedTransaction};
pub use traits::Ledger;
