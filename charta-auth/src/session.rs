// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashMap;

use charta_core::cbor::encode_cbor;
use charta_core::{DocumentId, InstanceId, PrivateKey, PublicKey};
use charta_ledger::contract::{ACCESS_RIGHT_CONTRACT, CMD_BIND, CMD_EVOLVE, CMD_UPDATE, DOCUMENT_CONTRACT};
use charta_ledger::{Argument, Instruction, Ledger, StagedState, Transaction};
use tracing::debug;

use crate::access::{ACCESS_RIGHT_NAME, AccessRight, AccessRightError};
use crate::coordinator::Coordinator;
use crate::document::{Document, Policy, Rules, Signer};
use crate::error::AuthError;

/// Default number of rounds a staged transaction stays executable.
pub const DEFAULT_EXPIRY_ROUNDS: u64 = 100;

/// One actor's session: an identity, a ledger handle and a local submission
/// counter, exposing the workflow operations users invoke.
///
/// Sessions are independent processes as far as the workflow is concerned;
/// several of them may act on the same documents concurrently and coordinate
/// solely through the ledger. The submission counter orders this identity's
/// ledger writes: it is consumed exactly once per transaction the session
/// originates, and writes made with the same identity outside the session
/// must be accounted for with [`Session::note_external_submission`].
#[derive(Debug)]
pub struct Session<L> {
    private_key: PrivateKey,
    counter: u64,
    policy: Policy,
    expiry_rounds: u64,
    genesis: DocumentId,
    known_signers: HashMap<DocumentId, Vec<Signer>>,
    coordinator: Coordinator<L>,
}

impl<L: Ledger> Session<L> {
    /// Session with a freshly generated key pair.
    ///
    /// The new identity holds no authorization until some document's rules
    /// grant it one; until then it can only propose and sign where membership
    /// rules allow.
    pub fn new(ledger: L) -> Result<Self, AuthError> {
        Self::with_signer(ledger, PrivateKey::new())
    }

    /// Session bound to an existing identity, e.g. a super-admin
    /// bootstrapping the system.
    pub fn with_signer(ledger: L, private_key: PrivateKey) -> Result<Self, AuthError> {
        let genesis = ledger.genesis()?;
        Ok(Self {
            private_key,
            counter: 0,
            policy: Policy::default(),
            expiry_rounds: DEFAULT_EXPIRY_ROUNDS,
            genesis,
            known_signers: HashMap::new(),
            coordinator: Coordinator::new(ledger),
        })
    }

    /// Quorum policy used when this session rebuilds collective rules.
    /// Unanimity over the current signer set is the default.
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Validity window of staged transactions proposed by this session.
    pub fn with_expiry_rounds(mut self, rounds: u64) -> Self {
        self.expiry_rounds = rounds;
        self
    }

    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    pub fn identity(&self) -> Signer {
        Signer::Key(self.public_key())
    }

    pub fn signer_counter(&self) -> u64 {
        self.counter
    }

    pub fn genesis(&self) -> DocumentId {
        self.genesis
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Read and decode the current version of a document.
    pub fn document(&self, id: &DocumentId) -> Result<Document, AuthError> {
        self.coordinator.document(id)
    }

    /// Account for a ledger transaction submitted with this identity outside
    /// of this session, keeping the counter invariant intact.
    pub fn note_external_submission(&mut self) {
        self.counter += 1;
    }

    /// Overwrite the cached signer roster of a document with a caller-supplied
    /// list. The cache is never refreshed implicitly: callers own its
    /// consistency with on-ledger state, a stale roster makes later quorum
    /// estimates under- or over-count.
    pub fn sync_signers(&mut self, document: DocumentId, signers: Vec<Signer>) {
        self.known_signers.insert(document, signers);
    }

    /// Refresh the cached signer roster from the current on-ledger document.
    pub fn sync_signers_from_ledger(
        &mut self,
        document: &DocumentId,
    ) -> Result<Vec<Signer>, AuthError> {
        let signers = self.coordinator.document(document)?.signers().to_vec();
        self.known_signers.insert(*document, signers.clone());
        Ok(signers)
    }

    /// The cached signer roster of a document, if any.
    pub fn known_signers(&self, document: &DocumentId) -> Option<&[Signer]> {
        self.known_signers.get(document).map(Vec::as_slice)
    }

    // Direct operations. These submit immediately, governed by the scope's
    // own rules, and consume one submission counter value.

    /// Spawn a new authorization document governed by the genesis scope.
    pub fn spawn_document(
        &mut self,
        signers: Vec<Signer>,
        rules: Rules,
    ) -> Result<Document, AuthError> {
        let genesis = self.genesis;
        self.spawn_document_in(&genesis, signers, rules)
    }

    /// Spawn the root admin document: this session's identity plus any synced
    /// genesis roster, with the standard rule set for the active policy.
    pub fn spawn_root_document(&mut self) -> Result<Document, AuthError> {
        let mut signers = self
            .known_signers
            .get(&self.genesis)
            .cloned()
            .unwrap_or_default();
        let identity = self.identity();
        if !signers.contains(&identity) {
            signers.insert(0, identity);
        }
        let rules = Rules::standard(&self.policy, &signers);
        self.spawn_document(signers, rules)
    }

    /// Bind an access-right record under the project's well-known name, so it
    /// can later be resolved without tracking its raw instance identifier.
    pub fn attach_access_right(
        &mut self,
        record: &InstanceId,
        project: &DocumentId,
    ) -> Result<(), AuthError> {
        let args = vec![
            Argument::new("name", ACCESS_RIGHT_NAME.as_bytes().to_vec()),
            Argument::new("instance", record.as_bytes().to_vec()),
        ];
        let counter = self.counter + 1;
        let instruction =
            Instruction::invoke(project.instance(), CMD_BIND, args).with_counters(vec![counter]);
        let mut transaction = Transaction::new(instruction);
        transaction.sign(&self.private_key);
        self.coordinator.ledger().submit(transaction)?;
        self.counter = counter;
        debug!(record = %record, project = %project, "bound access-right record");
        Ok(())
    }

    // Staged operations. Each returns the identifier of a staged transaction
    // which must collect a quorum of signatures and be executed before the
    // change takes effect.

    /// Propose adding a signer to a document.
    pub fn add_signer(
        &mut self,
        document: &DocumentId,
        signer: Signer,
    ) -> Result<InstanceId, AuthError> {
        let current = self.coordinator.document(document)?;
        let evolved = current.with_signer_added(signer, &self.policy)?;
        self.propose_evolution(&current, evolved)
    }

    /// Propose removing a signer from a document.
    pub fn remove_signer(
        &mut self,
        document: &DocumentId,
        signer: &Signer,
    ) -> Result<InstanceId, AuthError> {
        let current = self.coordinator.document(document)?;
        let evolved = current.with_signer_removed(signer, &self.policy)?;
        self.propose_evolution(&current, evolved)
    }

    /// Propose replacing a signer in place, e.g. to rotate a key.
    pub fn replace_signer(
        &mut self,
        document: &DocumentId,
        outgoing: &Signer,
        incoming: Signer,
    ) -> Result<InstanceId, AuthError> {
        let current = self.coordinator.document(document)?;
        let evolved = current.with_signer_replaced(outgoing, incoming, &self.policy)?;
        self.propose_evolution(&current, evolved)
    }

    /// Propose a new project document owned by the given admin document.
    ///
    /// Returns the staged transaction identifier and the base identifier the
    /// project document will have once the proposal is committed.
    pub fn create_project(
        &mut self,
        admin: &DocumentId,
        name: &str,
    ) -> Result<(InstanceId, DocumentId), AuthError> {
        let scope = self.coordinator.document(admin)?;
        let signers = vec![Signer::Document(*admin)];
        let rules = Rules::standard(&self.policy, &signers);
        let args = vec![
            Argument::new("signers", encode_cbor(&signers)?),
            Argument::new("rules", encode_cbor(&rules)?),
            Argument::new("name", name.as_bytes().to_vec()),
        ];
        let proposed = Instruction::spawn(admin.instance(), DOCUMENT_CONTRACT, args);
        let project = DocumentId::from(proposed.derived_id());
        let id = self.propose(&scope, proposed)?;
        debug!(staged = %id, project = %project, name, "proposed project document");
        Ok((id, project))
    }

    /// Propose spawning the access-right record of a project.
    pub fn create_access_right(&mut self, project: &DocumentId) -> Result<InstanceId, AuthError> {
        let scope = self.coordinator.document(project)?;
        let args = vec![Argument::new("project", project.as_bytes().to_vec())];
        let proposed = Instruction::spawn(project.instance(), ACCESS_RIGHT_CONTRACT, args);
        self.propose(&scope, proposed)
    }

    /// Propose adding actions to a querier's grant set (additive).
    pub fn grant_access(
        &mut self,
        project: &DocumentId,
        querier: &str,
        actions: &[&str],
    ) -> Result<InstanceId, AuthError> {
        self.propose_access_update(project, querier, actions, false)
    }

    /// Propose replacing a querier's grant set with exactly these actions.
    pub fn set_access(
        &mut self,
        project: &DocumentId,
        querier: &str,
        actions: &[&str],
    ) -> Result<InstanceId, AuthError> {
        self.propose_access_update(project, querier, actions, true)
    }

    /// Check a querier's access on a project.
    ///
    /// This is a direct ledger read, always synchronous, requiring no quorum.
    pub fn verify_access(
        &self,
        querier: &str,
        action: &str,
        project: &DocumentId,
    ) -> Result<bool, AuthError> {
        let record_id = self
            .coordinator
            .ledger()
            .resolve_name(project, ACCESS_RIGHT_NAME)?;
        let record: AccessRight = self.coordinator.ledger().fetch(&record_id)?.decode()?;
        record.is_authorized(querier, action).map_err(|err| match err {
            AccessRightError::UnknownQuerier(querier) => AuthError::UnknownQuerier(querier),
        })
    }

    /// Sign a staged transaction, filling the given rule-clause slot.
    pub fn sign(&mut self, id: &InstanceId, slot: usize) -> Result<(), AuthError> {
        let counter = self.counter + 1;
        self.coordinator
            .add_signature(&self.private_key, counter, id, slot)?;
        self.counter = counter;
        Ok(())
    }

    /// Execute a staged transaction once its quorum is satisfied.
    pub fn execute(&mut self, id: &InstanceId) -> Result<(), AuthError> {
        let counter = self.counter + 1;
        self.coordinator.execute(&self.private_key, counter, id)?;
        self.counter = counter;
        Ok(())
    }

    /// Discover staged transactions on the ledger, refreshing the local
    /// cache of known identifiers.
    pub fn fetch_staged_ids(&mut self) -> Result<Vec<InstanceId>, AuthError> {
        self.coordinator.fetch_known()
    }

    /// Staged transaction identifiers this session has seen so far.
    pub fn known_staged_ids(&self) -> &[InstanceId] {
        self.coordinator.known()
    }

    /// Observable state of a staged transaction at the current round.
    pub fn staged_state(&self, id: &InstanceId) -> Result<StagedState, AuthError> {
        self.coordinator.staged_state(id)
    }

    /// Identifier of the instance a staged spawn proposal will create.
    pub fn staged_spawn_id(&self, id: &InstanceId) -> Result<InstanceId, AuthError> {
        Ok(self.coordinator.staged(id)?.proposed.derived_id())
    }

    /// Block until the ledger reports further rounds of propagation. Required
    /// before reads which depend on a very recent write.
    pub fn wait_propagation(&self, rounds: u64) -> Result<(), AuthError> {
        self.coordinator.wait_propagation(rounds)
    }

    fn propose(
        &mut self,
        scope: &Document,
        proposed: Instruction,
    ) -> Result<InstanceId, AuthError> {
        let counter = self.counter + 1;
        let expires_after = self.coordinator.ledger().current_round()? + self.expiry_rounds;
        let id = self
            .coordinator
            .propose(&self.private_key, counter, scope, proposed, expires_after)?;
        self.counter = counter;
        Ok(id)
    }

    fn propose_evolution(
        &mut self,
        current: &Document,
        evolved: Document,
    ) -> Result<InstanceId, AuthError> {
        let args = vec![Argument::new("document", encode_cbor(&evolved)?)];
        let proposed = Instruction::invoke(current.base_id().instance(), CMD_EVOLVE, args);
        self.propose(current, proposed)
    }

    fn propose_access_update(
        &mut self,
        project: &DocumentId,
        querier: &str,
        actions: &[&str],
        replace: bool,
    ) -> Result<InstanceId, AuthError> {
        let record = self
            .coordinator
            .ledger()
            .resolve_name(project, ACCESS_RIGHT_NAME)?;
        let scope = self.coordinator.document(project)?;
        let actions: Vec<String> = actions.iter().map(|action| action.to_string()).collect();
        let args = vec![
            Argument::new("querier", querier.as_bytes().to_vec()),
            Argument::new("actions", encode_cbor(&actions)?),
            Argument::new("replace", vec![u8::from(replace)]),
        ];
        let proposed = Instruction::invoke(record, CMD_UPDATE, args);
        self.propose(&scope, proposed)
    }

    fn spawn_document_in(
        &mut self,
        scope: &DocumentId,
        signers: Vec<Signer>,
        rules: Rules,
    ) -> Result<Document, AuthError> {
        let args = vec![
            Argument::new("signers", encode_cbor(&signers)?),
            Argument::new("rules", encode_cbor(&rules)?),
        ];
        let counter = self.counter + 1;
        let instruction = Instruction::spawn(scope.instance(), DOCUMENT_CONTRACT, args)
            .with_counters(vec![counter]);
        let base_id = DocumentId::from(instruction.derived_id());
        let mut transaction = Transaction::new(instruction);
        transaction.sign(&self.private_key);
        self.coordinator.ledger().submit(transaction)?;
        self.counter = counter;
        debug!(document = %base_id, "spawned document");
        Ok(Document::new(base_id, signers, rules))
    }
}
