// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use charta_core::cbor::encode_cbor;
use charta_core::{DocumentId, InstanceId, PublicKey, Signature};
use charta_ledger::contract::{
    ACCESS_RIGHT_CONTRACT, CMD_ACCEPT, CMD_BIND, CMD_COMMIT, CMD_EVOLVE, CMD_UPDATE,
    DOCUMENT_CONTRACT, STAGED_CONTRACT,
};
use charta_ledger::{
    Instance, Instruction, Ledger, LedgerError, Operation, SignatureEntry, StagedTransaction,
    Transaction,
};
use serde::de::DeserializeOwned;

use crate::access::AccessRight;
use crate::coordinator::governing_action;
use crate::document::{
    ACTION_BIND, ACTION_SIGN, ACTION_SPAWN_STAGED, Document, Policy, Rules, Signer,
};
use crate::expression::Expression;

/// An in-memory ledger implementing the staged-transaction primitive.
///
/// Behaves like a single always-consistent ledger node: submissions are
/// validated against the governing documents' rules, signer counters and
/// signature crypto, then applied immediately. Every committed transaction
/// advances the round counter, which also drives staged-transaction expiry.
/// `wait_propagation` advances rounds as well, so the required
/// read-after-write call pattern is honored without simulating visibility
/// lag.
///
/// Handles are cheap clones sharing the same state, one per actor session.
#[derive(Clone, Debug)]
pub struct MemoryLedger {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug)]
struct Inner {
    genesis: DocumentId,
    round: u64,
    counters: HashMap<PublicKey, u64>,
    instances: HashMap<InstanceId, Instance>,
    names: HashMap<(DocumentId, String), InstanceId>,
    staged: HashMap<InstanceId, StagedTransaction>,
    staged_order: Vec<InstanceId>,
    unavailable: bool,
    stalled: bool,
}

impl MemoryLedger {
    /// Ledger with a genesis document whose roster are the given identities.
    ///
    /// The genesis rules follow the standard set under unanimity: collective
    /// actions need every genesis identity, staging and binding any one of
    /// them.
    pub fn new(genesis_identities: impl IntoIterator<Item = PublicKey>) -> Self {
        let signers: Vec<Signer> = genesis_identities.into_iter().map(Signer::Key).collect();
        let rules = Rules::standard(&Policy::Unanimous, &signers);
        let document = Document::create(signers, rules);
        let genesis = document.base_id();

        let mut instances = HashMap::new();
        instances.insert(
            genesis.instance(),
            document_instance(genesis.instance(), &document),
        );

        let inner = Inner {
            genesis,
            round: 0,
            counters: HashMap::new(),
            instances,
            names: HashMap::new(),
            staged: HashMap::new(),
            staged_order: Vec::new(),
            unavailable: false,
            stalled: false,
        };

        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// The genesis document, the root authorization scope.
    pub fn genesis_document(&self) -> Document {
        let inner = self.read();
        inner
            .document(&inner.genesis)
            .expect("genesis document present")
    }

    /// Make submissions and reads fail with `Unavailable`, simulating a
    /// transport or consensus-layer outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.write().unavailable = unavailable;
    }

    /// Make `wait_propagation` fail with `Timeout`, simulating a stalled
    /// ledger.
    pub fn set_stalled(&self, stalled: bool) {
        self.write().stalled = stalled;
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .expect("acquire shared read access on ledger")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .expect("acquire exclusive write access on ledger")
    }
}

impl Ledger for MemoryLedger {
    fn submit(&self, transaction: Transaction) -> Result<(), LedgerError> {
        let mut inner = self.write();
        if inner.unavailable {
            return Err(LedgerError::Unavailable("ledger partitioned".to_string()));
        }
        inner.submit(transaction)
    }

    fn fetch(&self, id: &InstanceId) -> Result<Instance, LedgerError> {
        let inner = self.read();
        if inner.unavailable {
            return Err(LedgerError::Unavailable("ledger partitioned".to_string()));
        }
        inner
            .instances
            .get(id)
            .cloned()
            .ok_or(LedgerError::UnknownInstance(*id))
    }

    fn fetch_staged(&self, id: &InstanceId) -> Result<StagedTransaction, LedgerError> {
        let inner = self.read();
        if inner.unavailable {
            return Err(LedgerError::Unavailable("ledger partitioned".to_string()));
        }
        inner
            .staged
            .get(id)
            .cloned()
            .ok_or(LedgerError::UnknownInstance(*id))
    }

    fn resolve_name(&self, scope: &DocumentId, name: &str) -> Result<InstanceId, LedgerError> {
        let inner = self.read();
        if inner.unavailable {
            return Err(LedgerError::Unavailable("ledger partitioned".to_string()));
        }
        inner
            .names
            .get(&(*scope, name.to_string()))
            .copied()
            .ok_or_else(|| LedgerError::UnknownName(name.to_string()))
    }

    fn wait_propagation(&self, rounds: u64) -> Result<(), LedgerError> {
        let mut inner = self.write();
        if inner.stalled {
            return Err(LedgerError::Timeout);
        }
        inner.round += rounds;
        Ok(())
    }

    fn staged_ids(&self) -> Result<Vec<InstanceId>, LedgerError> {
        let inner = self.read();
        if inner.unavailable {
            return Err(LedgerError::Unavailable("ledger partitioned".to_string()));
        }
        Ok(inner.staged_order.clone())
    }

    fn current_round(&self) -> Result<u64, LedgerError> {
        Ok(self.read().round)
    }

    fn genesis(&self) -> Result<DocumentId, LedgerError> {
        Ok(self.read().genesis)
    }
}

fn document_instance(id: InstanceId, document: &Document) -> Instance {
    Instance {
        id,
        contract: DOCUMENT_CONTRACT.to_string(),
        scope: document.base_id(),
        version: document.version(),
        data: encode_cbor(document).expect("CBOR encoder failed due to a critical IO error"),
    }
}

impl Inner {
    fn submit(&mut self, transaction: Transaction) -> Result<(), LedgerError> {
        if transaction.signatures.is_empty()
            || transaction.signatures.len() != transaction.instruction.signer_counters.len()
        {
            return Err(LedgerError::Rejected(
                "signature and counter lists must match".to_string(),
            ));
        }
        if !transaction.verify() {
            return Err(LedgerError::InvalidSignature);
        }
        for (entry, counter) in transaction
            .signatures
            .iter()
            .zip(&transaction.instruction.signer_counters)
        {
            let expected = self.counters.get(&entry.signer).copied().unwrap_or(0) + 1;
            if *counter != expected {
                return Err(LedgerError::InvalidCounter {
                    expected,
                    got: *counter,
                });
            }
        }

        let present: HashSet<Signer> = transaction
            .signatures
            .iter()
            .map(|entry| Signer::Key(entry.signer))
            .collect();
        self.apply(&transaction.instruction, &present)?;

        // Counters are consumed only by accepted transactions.
        for entry in &transaction.signatures {
            *self.counters.entry(entry.signer).or_insert(0) += 1;
        }
        self.round += 1;
        Ok(())
    }

    fn apply(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        match &instruction.operation {
            Operation::Spawn { contract, .. } if contract == DOCUMENT_CONTRACT => {
                self.spawn_document(instruction, present)
            }
            Operation::Spawn { contract, .. } if contract == STAGED_CONTRACT => {
                self.spawn_staged(instruction, present)
            }
            Operation::Spawn { contract, .. } if contract == ACCESS_RIGHT_CONTRACT => {
                self.spawn_access_right(instruction, present)
            }
            Operation::Invoke { command, .. } if command == CMD_EVOLVE => {
                self.evolve_document(instruction, present)
            }
            Operation::Invoke { command, .. } if command == CMD_ACCEPT => {
                self.accept_signature(instruction, present)
            }
            Operation::Invoke { command, .. } if command == CMD_COMMIT => {
                self.commit_staged(instruction)
            }
            Operation::Invoke { command, .. } if command == CMD_UPDATE => {
                self.update_access_right(instruction, present)
            }
            Operation::Invoke { command, .. } if command == CMD_BIND => {
                self.bind_name(instruction, present)
            }
            Operation::Spawn { contract, .. } => Err(LedgerError::Rejected(format!(
                "unknown contract \"{contract}\""
            ))),
            Operation::Invoke { command, .. } => Err(LedgerError::Rejected(format!(
                "unknown command \"{command}\""
            ))),
        }
    }

    fn spawn_document(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let scope = self.scope_document(&instruction.target)?;
        if !self.rule_satisfied(&scope, &governing_action(instruction), present) {
            return Err(LedgerError::Unauthorized);
        }

        let signers: Vec<Signer> = arg_decoded(instruction, "signers")?;
        let rules: Rules = arg_decoded(instruction, "rules")?;
        let id = instruction.derived_id();
        if self.instances.contains_key(&id) {
            return Err(LedgerError::Rejected("instance already exists".to_string()));
        }

        let document = Document::new(DocumentId::from(id), signers, rules);
        self.instances.insert(id, document_instance(id, &document));
        Ok(())
    }

    fn spawn_staged(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let scope = self.scope_document(&instruction.target)?;
        // Any member of the scope may stage a proposal; an explicit staging
        // rule may widen or narrow this.
        let authorized = match scope.rules().get(ACTION_SPAWN_STAGED) {
            Some(rule) => rule.evaluate_with(present, &|id| self.member_expression(id)),
            None => self.membership_satisfied(&scope, present),
        };
        if !authorized {
            return Err(LedgerError::Unauthorized);
        }

        let proposed: Instruction = arg_decoded(instruction, "instruction")?;
        let expires_after = arg_u64(instruction, "expires_after")?;
        let id = instruction.derived_id();
        if self.staged.contains_key(&id) {
            return Err(LedgerError::Rejected(
                "staged transaction already exists".to_string(),
            ));
        }

        self.staged.insert(
            id,
            StagedTransaction::new(id, scope.base_id(), proposed, expires_after),
        );
        self.staged_order.push(id);
        Ok(())
    }

    fn spawn_access_right(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let scope = self.scope_document(&instruction.target)?;
        if !self.rule_satisfied(&scope, &governing_action(instruction), present) {
            return Err(LedgerError::Unauthorized);
        }

        let project = DocumentId::from(arg_id(instruction, "project")?);
        let id = instruction.derived_id();
        if self.instances.contains_key(&id) {
            return Err(LedgerError::Rejected("instance already exists".to_string()));
        }

        let record = AccessRight::new(project);
        self.instances.insert(
            id,
            Instance {
                id,
                contract: ACCESS_RIGHT_CONTRACT.to_string(),
                scope: scope.base_id(),
                version: 0,
                data: encode_cbor(&record)
                    .expect("CBOR encoder failed due to a critical IO error"),
            },
        );
        Ok(())
    }

    fn evolve_document(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let current = self.scope_document(&instruction.target)?;
        // Self-governance: the mutation must satisfy the *current* version's
        // evolve rule.
        if !self.rule_satisfied(&current, &governing_action(instruction), present) {
            return Err(LedgerError::Unauthorized);
        }

        let next: Document = arg_decoded(instruction, "document")?;
        if next.base_id() != current.base_id() {
            return Err(LedgerError::Rejected(
                "base identifier must not change".to_string(),
            ));
        }
        if next.version() != current.version() + 1 {
            return Err(LedgerError::Rejected(
                "version must increase by exactly one".to_string(),
            ));
        }

        self.instances
            .insert(instruction.target, document_instance(instruction.target, &next));
        Ok(())
    }

    fn accept_signature(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let staged = self
            .staged
            .get(&instruction.target)
            .cloned()
            .ok_or(LedgerError::UnknownInstance(instruction.target))?;
        if staged.executed {
            return Err(LedgerError::AlreadyExecuted);
        }
        if staged.is_expired(self.round) {
            return Err(LedgerError::Expired);
        }

        let signer = single_key(present)?;
        let slot = arg_u64(instruction, "slot")? as usize;
        if staged.has_signed(&signer, slot) {
            return Err(LedgerError::DuplicateSignature);
        }

        let signature = Signature::from_bytes(arg_raw(instruction, "signature")?)
            .map_err(|err| LedgerError::Rejected(err.to_string()))?;
        if !signer.verify(&staged.proposed.digest(), &signature) {
            return Err(LedgerError::InvalidSignature);
        }

        let scope = self.document(&staged.scope)?;
        if !self.membership_satisfied(&scope, &HashSet::from([Signer::Key(signer)])) {
            return Err(LedgerError::Unauthorized);
        }

        self.staged
            .get_mut(&instruction.target)
            .expect("staged transaction present")
            .signatures
            .push(SignatureEntry {
                signer,
                slot,
                signature,
            });
        Ok(())
    }

    fn commit_staged(&mut self, instruction: &Instruction) -> Result<(), LedgerError> {
        let staged = self
            .staged
            .get(&instruction.target)
            .cloned()
            .ok_or(LedgerError::UnknownInstance(instruction.target))?;
        if staged.executed {
            return Err(LedgerError::AlreadyExecuted);
        }
        if staged.is_expired(self.round) {
            return Err(LedgerError::Expired);
        }

        // Sole arbiter: quorum is judged against the rules of the scope
        // document as stored right now, not as seen by any client.
        let scope = self.document(&staged.scope)?;
        let action = governing_action(&staged.proposed);
        let collected: HashSet<Signer> = staged
            .signers()
            .into_iter()
            .map(Signer::Key)
            .collect();
        if !self.rule_satisfied(&scope, &action, &collected) {
            return Err(LedgerError::Unauthorized);
        }

        self.apply(&staged.proposed, &collected)?;
        self.staged
            .get_mut(&instruction.target)
            .expect("staged transaction present")
            .executed = true;
        Ok(())
    }

    fn update_access_right(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let (scope_id, mut record, version) = {
            let instance = self
                .instances
                .get(&instruction.target)
                .ok_or(LedgerError::UnknownInstance(instruction.target))?;
            if instance.contract != ACCESS_RIGHT_CONTRACT {
                return Err(LedgerError::Rejected(
                    "update target must be an access-right record".to_string(),
                ));
            }
            let record: AccessRight = instance
                .decode()
                .map_err(|err| LedgerError::Rejected(err.to_string()))?;
            (instance.scope, record, instance.version)
        };

        let scope = self.document(&scope_id)?;
        if !self.rule_satisfied(&scope, &governing_action(instruction), present) {
            return Err(LedgerError::Unauthorized);
        }

        let querier = arg_utf8(instruction, "querier")?;
        let actions: Vec<String> = arg_decoded(instruction, "actions")?;
        let replace = matches!(arg_raw(instruction, "replace")?, [1]);
        if replace {
            record.set(&querier, actions);
        } else {
            record.grant(&querier, actions);
        }

        let instance = self
            .instances
            .get_mut(&instruction.target)
            .expect("access-right instance present");
        instance.version = version + 1;
        instance.data =
            encode_cbor(&record).expect("CBOR encoder failed due to a critical IO error");
        Ok(())
    }

    fn bind_name(
        &mut self,
        instruction: &Instruction,
        present: &HashSet<Signer>,
    ) -> Result<(), LedgerError> {
        let scope = self.scope_document(&instruction.target)?;
        let authorized = match scope.rules().get(ACTION_BIND) {
            Some(rule) => rule.evaluate_with(present, &|id| self.member_expression(id)),
            None => self.membership_satisfied(&scope, present),
        };
        if !authorized {
            return Err(LedgerError::Unauthorized);
        }

        let name = arg_utf8(instruction, "name")?;
        let target = arg_id(instruction, "instance")?;
        if !self.instances.contains_key(&target) {
            return Err(LedgerError::UnknownInstance(target));
        }

        self.names.insert((scope.base_id(), name), target);
        Ok(())
    }

    fn document(&self, id: &DocumentId) -> Result<Document, LedgerError> {
        let instance = self
            .instances
            .get(&id.instance())
            .ok_or(LedgerError::UnknownInstance(id.instance()))?;
        instance
            .decode::<Document>()
            .map_err(|err| LedgerError::Rejected(err.to_string()))
    }

    /// The document instance an instruction targets, the scope governing it.
    fn scope_document(&self, target: &InstanceId) -> Result<Document, LedgerError> {
        let instance = self
            .instances
            .get(target)
            .ok_or(LedgerError::UnknownInstance(*target))?;
        if instance.contract != DOCUMENT_CONTRACT {
            return Err(LedgerError::Rejected(
                "target must be a document instance".to_string(),
            ));
        }
        instance
            .decode::<Document>()
            .map_err(|err| LedgerError::Rejected(err.to_string()))
    }

    fn rule_satisfied(
        &self,
        scope: &Document,
        action: &str,
        present: &HashSet<Signer>,
    ) -> bool {
        match scope.rules().get(action) {
            Some(rule) => rule.evaluate_with(present, &|id| self.sign_expression(id)),
            None => false,
        }
    }

    fn membership_satisfied(&self, scope: &Document, present: &HashSet<Signer>) -> bool {
        Expression::any_of(scope.signers().iter().copied())
            .evaluate_with(present, &|id| self.member_expression(id))
    }

    fn sign_expression(&self, id: &DocumentId) -> Option<Expression> {
        let document = self.document(id).ok()?;
        Some(match document.rules().get(ACTION_SIGN) {
            Some(expression) => expression.clone(),
            None => Expression::any_of(document.signers().iter().copied()),
        })
    }

    fn member_expression(&self, id: &DocumentId) -> Option<Expression> {
        let document = self.document(id).ok()?;
        Some(Expression::any_of(document.signers().iter().copied()))
    }
}

fn single_key(present: &HashSet<Signer>) -> Result<PublicKey, LedgerError> {
    let mut keys = present.iter().filter_map(|signer| match signer {
        Signer::Key(public_key) => Some(*public_key),
        Signer::Document(_) => None,
    });
    match (keys.next(), keys.next()) {
        (Some(key), None) => Ok(key),
        _ => Err(LedgerError::Rejected(
            "exactly one identity must sign".to_string(),
        )),
    }
}

fn arg_raw<'a>(instruction: &'a Instruction, name: &str) -> Result<&'a [u8], LedgerError> {
    instruction
        .operation
        .arg(name)
        .ok_or_else(|| LedgerError::Rejected(format!("missing argument \"{name}\"")))
}

fn arg_decoded<T: DeserializeOwned>(
    instruction: &Instruction,
    name: &str,
) -> Result<T, LedgerError> {
    charta_core::cbor::decode_cbor(arg_raw(instruction, name)?)
        .map_err(|err| LedgerError::Rejected(err.to_string()))
}

fn arg_u64(instruction: &Instruction, name: &str) -> Result<u64, LedgerError> {
    let bytes: [u8; 8] = arg_raw(instruction, name)?
        .try_into()
        .map_err(|_| LedgerError::Rejected(format!("argument \"{name}\" must be 8 bytes")))?;
    Ok(u64::from_be_bytes(bytes))
}

fn arg_utf8(instruction: &Instruction, name: &str) -> Result<String, LedgerError> {
    String::from_utf8(arg_raw(instruction, name)?.to_vec())
        .map_err(|err| LedgerError::Rejected(err.to_string()))
}

fn arg_id(instruction: &Instruction, name: &str) -> Result<InstanceId, LedgerError> {
    InstanceId::try_from(arg_raw(instruction, name)?)
        .map_err(|err| LedgerError::Rejected(err.to_string()))
}
