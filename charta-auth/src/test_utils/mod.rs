// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test doubles for the authorization workflow.
mod ledger;

pub use ledger::MemoryLedger;
