// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use charta_core::cbor::encode_cbor;
use charta_core::{DocumentId, InstanceId, PrivateKey};
use charta_ledger::contract::{CMD_ACCEPT, CMD_COMMIT, STAGED_CONTRACT};
use charta_ledger::{
    Argument, Instruction, Ledger, LedgerError, Operation, StagedState, StagedTransaction,
    Transaction,
};
use tracing::debug;

use crate::document::{ACTION_SIGN, ACTION_SPAWN_STAGED, Document, Signer};
use crate::error::AuthError;
use crate::expression::Expression;

/// Name of the rule action governing an instruction when it is committed.
pub fn governing_action(instruction: &Instruction) -> String {
    match &instruction.operation {
        Operation::Spawn { contract, .. } => format!("spawn:{contract}"),
        Operation::Invoke { command, .. } => format!("invoke:{command}"),
    }
}

/// Builds, signs and commits staged transactions against a ledger.
///
/// The coordinator holds no authority of its own: all checks are made against
/// fresh ledger state, and the only local state is a cache of staged
/// transaction identifiers this actor has seen. Signature collection is
/// order-independent: any subset of eligible signers may sign in any order
/// across independent sessions, and quorum is re-evaluated from the ledger's
/// view of the collected signatures on every execution attempt.
#[derive(Debug)]
pub struct Coordinator<L> {
    ledger: L,
    known: Vec<InstanceId>,
}

impl<L: Ledger> Coordinator<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            ledger,
            known: Vec::new(),
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Staged transaction identifiers this actor has seen so far.
    pub fn known(&self) -> &[InstanceId] {
        &self.known
    }

    /// Read and decode the current version of a document.
    pub fn document(&self, id: &DocumentId) -> Result<Document, AuthError> {
        let instance = self.ledger.fetch(&id.instance()).map_err(|err| match err {
            LedgerError::UnknownInstance(_) => AuthError::UnknownDocument(*id),
            err => err.into(),
        })?;
        Ok(instance.decode::<Document>()?)
    }

    /// Read a staged transaction, fresh from the ledger.
    pub fn staged(&self, id: &InstanceId) -> Result<StagedTransaction, AuthError> {
        self.ledger.fetch_staged(id).map_err(|err| match err {
            LedgerError::UnknownInstance(id) => AuthError::UnknownTransaction(id),
            err => err.into(),
        })
    }

    /// Observable state of a staged transaction at the current round.
    pub fn staged_state(&self, id: &InstanceId) -> Result<StagedState, AuthError> {
        let staged = self.staged(id)?;
        let round = self.ledger.current_round()?;
        let scope = self.document(&staged.scope)?;
        let action = governing_action(&staged.proposed);
        let quorum = self.quorum_reached(&scope, &action, &staged)?;
        Ok(staged.state(round, quorum))
    }

    /// Whether an identity is a signer of the document, directly or through a
    /// nested document reference.
    pub fn is_member(&self, document: &Document, identity: &Signer) -> bool {
        let present = HashSet::from([*identity]);
        Expression::any_of(document.signers().iter().copied())
            .evaluate_with(&present, &|id| self.member_expression(id))
    }

    /// Whether the signatures collected on a staged transaction satisfy the
    /// given rule action of the document, evaluated right now.
    pub fn quorum_reached(
        &self,
        document: &Document,
        action: &str,
        staged: &StagedTransaction,
    ) -> Result<bool, AuthError> {
        let Some(rule) = document.rules().get(action) else {
            return Err(AuthError::RuleViolation);
        };
        let present: HashSet<Signer> = staged.signers().into_iter().map(Signer::Key).collect();
        Ok(rule.evaluate_with(&present, &|id| self.sign_expression(id)))
    }

    /// Stage a proposed instruction against a scope document.
    ///
    /// The proposer must be a signer of the scope, unless the scope's staging
    /// rule explicitly permits third-party proposals. One submission counter
    /// value of the proposer is consumed.
    pub fn propose(
        &mut self,
        signer: &PrivateKey,
        counter: u64,
        scope: &Document,
        proposed: Instruction,
        expires_after: u64,
    ) -> Result<InstanceId, AuthError> {
        let identity = Signer::Key(signer.public_key());
        let authorized = match scope.rules().get(ACTION_SPAWN_STAGED) {
            Some(rule) => rule.evaluate_with(&HashSet::from([identity]), &|id| {
                self.member_expression(id)
            }),
            None => self.is_member(scope, &identity),
        };
        if !authorized {
            return Err(AuthError::RuleViolation);
        }

        let args = vec![
            Argument::new("instruction", encode_cbor(&proposed)?),
            Argument::new("expires_after", expires_after.to_be_bytes().to_vec()),
        ];
        let instruction = Instruction::spawn(scope.base_id().instance(), STAGED_CONTRACT, args)
            .with_counters(vec![counter]);
        let id = instruction.derived_id();

        let mut transaction = Transaction::new(instruction);
        transaction.sign(signer);
        self.ledger.submit(transaction)?;
        debug!(staged = %id, scope = %scope.base_id(), "proposed staged transaction");

        self.known.push(id);
        Ok(id)
    }

    /// Append a signature over the staged transaction's instruction digest.
    ///
    /// The slot selects which clause of the governing rule this signature
    /// satisfies; the same identity may fill different slots of a composite
    /// rule but never the same slot twice.
    pub fn add_signature(
        &mut self,
        signer: &PrivateKey,
        counter: u64,
        id: &InstanceId,
        slot: usize,
    ) -> Result<(), AuthError> {
        let staged = self.staged(id)?;
        if staged.executed {
            return Err(AuthError::AlreadyExecuted);
        }
        if staged.is_expired(self.ledger.current_round()?) {
            return Err(AuthError::Expired);
        }
        let public_key = signer.public_key();
        if staged.has_signed(&public_key, slot) {
            return Err(AuthError::AlreadySigned);
        }

        let scope = self.document(&staged.scope)?;
        if !self.is_member(&scope, &Signer::Key(public_key)) {
            return Err(AuthError::RuleViolation);
        }
        let slots = scope
            .rules()
            .get(&governing_action(&staged.proposed))
            .map(Expression::clause_count)
            .unwrap_or(1);
        if slot >= slots {
            return Err(AuthError::RuleViolation);
        }

        let signature = signer.sign(&staged.proposed.digest());
        let args = vec![
            Argument::new("slot", (slot as u64).to_be_bytes().to_vec()),
            Argument::new("signature", signature.to_bytes().to_vec()),
        ];
        let instruction = Instruction::invoke(*id, CMD_ACCEPT, args).with_counters(vec![counter]);

        let mut transaction = Transaction::new(instruction);
        transaction.sign(signer);
        self.ledger.submit(transaction)?;
        debug!(staged = %id, slot, "added signature");

        if !self.known.contains(id) {
            self.known.push(*id);
        }
        Ok(())
    }

    /// Commit a staged transaction.
    ///
    /// Re-evaluates the scope document's governing rule against the collected
    /// signatures before submitting. A failed quorum check leaves the
    /// collected signatures untouched, so execution can simply be retried
    /// after more signatures arrive.
    pub fn execute(
        &mut self,
        signer: &PrivateKey,
        counter: u64,
        id: &InstanceId,
    ) -> Result<(), AuthError> {
        let staged = self.staged(id)?;
        if staged.executed {
            return Err(AuthError::AlreadyExecuted);
        }
        if staged.is_expired(self.ledger.current_round()?) {
            return Err(AuthError::Expired);
        }

        let scope = self.document(&staged.scope)?;
        if !self.is_member(&scope, &Signer::Key(signer.public_key())) {
            return Err(AuthError::RuleViolation);
        }
        let action = governing_action(&staged.proposed);
        if !self.quorum_reached(&scope, &action, &staged)? {
            debug!(staged = %id, action = %action, "quorum not reached");
            return Err(AuthError::QuorumNotReached);
        }

        let instruction = Instruction::invoke(*id, CMD_COMMIT, vec![]).with_counters(vec![counter]);
        let mut transaction = Transaction::new(instruction);
        transaction.sign(signer);
        self.ledger.submit(transaction)?;
        debug!(staged = %id, "executed staged transaction");
        Ok(())
    }

    /// Query the ledger for all known staged transaction identifiers,
    /// refreshing the local cache. This is how actors who did not originate a
    /// proposal discover it.
    pub fn fetch_known(&mut self) -> Result<Vec<InstanceId>, AuthError> {
        let ids = self.ledger.staged_ids()?;
        self.known = ids.clone();
        Ok(ids)
    }

    /// Block until the ledger reports further rounds of propagation. Required
    /// before reads which depend on a very recent write.
    pub fn wait_propagation(&self, rounds: u64) -> Result<(), AuthError> {
        Ok(self.ledger.wait_propagation(rounds)?)
    }

    /// Signing expression of a document, used when rules reference other
    /// documents as signers.
    fn sign_expression(&self, id: &DocumentId) -> Option<Expression> {
        let document = self.document(id).ok()?;
        Some(match document.rules().get(ACTION_SIGN) {
            Some(expression) => expression.clone(),
            None => Expression::any_of(document.signers().iter().copied()),
        })
    }

    /// Membership expression of a document: any single signer, recursively.
    fn member_expression(&self, id: &DocumentId) -> Option<Expression> {
        let document = self.document(id).ok()?;
        Some(Expression::any_of(document.signers().iter().copied()))
    }
}
