// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::{DocumentId, InstanceId, PublicKey, Signature};
use serde::{Deserialize, Serialize};

use crate::instruction::Instruction;

/// A signature collected on a staged transaction.
///
/// The slot selects which clause of the governing rule this signer is
/// satisfying, so composite rules with several independent signer groups can
/// be filled in any order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub signer: PublicKey,
    pub slot: usize,
    pub signature: Signature,
}

/// Observable state of a staged transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StagedState {
    /// Proposed, no signatures collected yet.
    Proposed,

    /// Some signatures collected, quorum not yet reached.
    PartiallySigned(usize),

    /// The collected signatures satisfy the governing rule.
    QuorumReached,

    /// Committed. Terminal.
    Executed,

    /// The validity window lapsed before execution. Terminal.
    Expired,
}

/// A proposed ledger mutation waiting for a quorum of signatures.
///
/// The record lives on the ledger; every actor reads it fresh before signing
/// or executing. Signatures are append-only until execution and the ledger
/// commits a staged transaction at most once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedTransaction {
    /// Identifier derived from the instruction which proposed this staged
    /// transaction.
    pub id: InstanceId,

    /// Document whose rules govern the proposed instruction.
    pub scope: DocumentId,

    /// The pending mutation to apply on execution.
    pub proposed: Instruction,

    pub signatures: Vec<SignatureEntry>,

    /// Last ledger round in which this staged transaction may still be
    /// executed.
    pub expires_after: u64,

    pub executed: bool,
}

impl StagedTransaction {
    pub fn new(
        id: InstanceId,
        scope: DocumentId,
        proposed: Instruction,
        expires_after: u64,
    ) -> Self {
        Self {
            id,
            scope,
            proposed,
            signatures: Vec::new(),
            expires_after,
            executed: false,
        }
    }

    /// Whether the validity window has lapsed at the given round.
    pub fn is_expired(&self, round: u64) -> bool {
        !self.executed && round > self.expires_after
    }

    /// Whether this identity already signed the given slot.
    pub fn has_signed(&self, signer: &PublicKey, slot: usize) -> bool {
        self.signatures
            .iter()
            .any(|entry| &entry.signer == signer && entry.slot == slot)
    }

    /// Distinct signer identities collected so far, in signing order.
    pub fn signers(&self) -> Vec<PublicKey> {
        let mut signers: Vec<PublicKey> = Vec::new();
        for entry in &self.signatures {
            if !signers.contains(&entry.signer) {
                signers.push(entry.signer);
            }
        }
        signers
    }

    /// Observable state at the given round.
    ///
    /// Quorum is a property of the governing document's rule, which lives a
    /// layer above this record, so the caller passes the evaluation result in.
    pub fn state(&self, round: u64, quorum_reached: bool) -> StagedState {
        if self.executed {
            StagedState::Executed
        } else if self.is_expired(round) {
            StagedState::Expired
        } else if quorum_reached {
            StagedState::QuorumReached
        } else if self.signatures.is_empty() {
            StagedState::Proposed
        } else {
            StagedState::PartiallySigned(self.signatures.len())
        }
    }
}
