// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::cbor::encode_cbor;
use charta_core::{InstanceId, PrivateKey};
use charta_ledger::contract::DOCUMENT_CONTRACT;
use charta_ledger::{Argument, Instruction, Ledger, LedgerError, StagedState, Transaction};

use crate::document::{Policy, Rules, Signer};
use crate::error::AuthError;
use crate::session::Session;
use crate::test_utils::MemoryLedger;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Ledger with one super-admin identity plus that identity's session.
fn bootstrap() -> (MemoryLedger, Session<MemoryLedger>) {
    init_logging();
    let super_admin = PrivateKey::new();
    let ledger = MemoryLedger::new([super_admin.public_key()]);
    let session = Session::with_signer(ledger.clone(), super_admin).unwrap();
    (ledger, session)
}

#[test]
fn four_admins_join_the_admin_document() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    admcl.wait_propagation(1).unwrap();
    let adid = admin.base_id();
    assert_eq!(admcl.document(&adid).unwrap().version(), 0);

    // A single signature satisfies unanimity over the bootstrap roster.
    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.wait_propagation(1).unwrap();
    assert!(ledger.fetch_staged(&id).is_ok());
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
    assert_eq!(admcl.document(&adid).unwrap().version(), 1);

    // Adding a third admin now needs both existing admins.
    let mut admcl3 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl3.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    assert!(matches!(
        admcl.execute(&id),
        Err(AuthError::QuorumNotReached)
    ));
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    // And a fourth needs all three, signing in any order, from independent
    // sessions.
    let admcl4 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl4.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl3.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl3.execute(&id).unwrap();

    let document = admcl.document(&adid).unwrap();
    assert_eq!(document.version(), 3);
    assert_eq!(document.signers().len(), 4);
    assert_eq!(document.base_id(), adid);
    assert!(document.has_signer(&admcl4.identity()));
}

#[test]
fn removing_an_admin_requires_the_current_signer_set() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let mut admcl3 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl3.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    // Unanimity is judged over the *current* signer set, so removing admin 2
    // needs signatures from all three admins, including the one leaving.
    let id = admcl.remove_signer(&adid, &admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl3.sign(&id, 0).unwrap();
    assert!(matches!(
        admcl3.execute(&id),
        Err(AuthError::QuorumNotReached)
    ));
    admcl2.sign(&id, 0).unwrap();
    admcl3.execute(&id).unwrap();

    let document = admcl.document(&adid).unwrap();
    assert_eq!(document.signers().len(), 2);
    assert!(!document.has_signer(&admcl2.identity()));
}

#[test]
fn rotating_an_admin_key() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let replacement = Signer::Key(PrivateKey::new().public_key());
    let id = admcl
        .replace_signer(&adid, &admcl2.identity(), replacement)
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let document = admcl.document(&adid).unwrap();
    assert!(document.has_signer(&replacement));
    assert!(!document.has_signer(&admcl2.identity()));
    assert_eq!(document.signers().len(), 2);
}

#[test]
fn project_workflow() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let roster = admcl.sync_signers_from_ledger(&adid).unwrap();
    assert_eq!(roster.len(), 2);
    assert_eq!(admcl.known_signers(&adid), Some(&roster[..]));

    // The project document is owned by the admin collective through a nested
    // document reference.
    let (id, project) = admcl.create_project(&adid, "Project A").unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
    admcl.wait_propagation(1).unwrap();

    let project_document = admcl.document(&project).unwrap();
    assert_eq!(project_document.signers(), &[Signer::Document(adid)]);

    // Spawn the access-right record and bind it under the well-known name.
    let id = admcl.create_access_right(&project).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
    admcl.wait_propagation(1).unwrap();

    let record_id = admcl.staged_spawn_id(&id).unwrap();
    admcl.attach_access_right(&record_id, &project).unwrap();
    assert_eq!(ledger.resolve_name(&project, "AR").unwrap(), record_id);

    // Grant querier 1:1 two actions, then replace them with a single one.
    let id = admcl
        .grant_access(&project, "1:1", &["count_per_site_shuffled", "count_global"])
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
    assert!(admcl.verify_access("1:1", "count_global", &project).unwrap());

    let id = admcl
        .set_access(&project, "1:1", &["count_per_site_shuffled"])
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
    admcl.wait_propagation(1).unwrap();

    assert!(
        admcl
            .verify_access("1:1", "count_per_site_shuffled", &project)
            .unwrap()
    );
    assert!(!admcl.verify_access("1:1", "count_global", &project).unwrap());

    // A querier which was never granted anything is an error, not `false`.
    assert!(matches!(
        admcl.verify_access("2:1", "count_per_site_shuffled", &project),
        Err(AuthError::UnknownQuerier(querier)) if querier == "2:1"
    ));

    // A third admin joins; access-right changes now need all three because
    // the project rules follow the admin document's current signer set.
    let mut admcl3 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl3.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let id = admcl.grant_access(&project, "3:1", &["count_global"]).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    assert!(matches!(
        admcl.execute(&id),
        Err(AuthError::QuorumNotReached)
    ));
    admcl3.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    assert!(
        !admcl
            .verify_access("3:1", "count_per_site_shuffled", &project)
            .unwrap()
    );

    let id = admcl
        .set_access(&project, "3:1", &["count_per_site_shuffled"])
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl2.sign(&id, 0).unwrap();
    admcl3.sign(&id, 0).unwrap();
    admcl.wait_propagation(1).unwrap();
    admcl.execute(&id).unwrap();

    assert!(
        admcl
            .verify_access("3:1", "count_per_site_shuffled", &project)
            .unwrap()
    );
}

#[test]
fn staged_discovery_by_other_sessions() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    // admcl2 did not originate the proposal and discovers it from the ledger.
    let (id, _) = admcl.create_project(&adid, "Project A").unwrap();
    admcl.sign(&id, 0).unwrap();

    assert!(admcl2.known_staged_ids().is_empty());
    let ids = admcl2.fetch_staged_ids().unwrap();
    assert_eq!(ids, ledger.staged_ids().unwrap());
    assert_eq!(ids.last(), Some(&id));
    assert_eq!(admcl2.known_staged_ids(), &ids[..]);

    admcl2.sign(&id, 0).unwrap();
    admcl2.execute(&id).unwrap();
}

#[test]
fn execute_before_quorum_preserves_signatures() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let id = admcl
        .add_signer(&adid, Signer::Key(PrivateKey::new().public_key()))
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    assert!(matches!(
        admcl.execute(&id),
        Err(AuthError::QuorumNotReached)
    ));

    // The failed execution left the collected signatures untouched, so the
    // call can simply be retried once the quorum completes.
    assert_eq!(ledger.fetch_staged(&id).unwrap().signatures.len(), 1);
    admcl2.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();
}

#[test]
fn staged_transaction_states() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    admcl.execute(&id).unwrap();

    let id = admcl
        .add_signer(&adid, Signer::Key(PrivateKey::new().public_key()))
        .unwrap();
    assert_eq!(admcl.staged_state(&id).unwrap(), StagedState::Proposed);

    admcl.sign(&id, 0).unwrap();
    assert_eq!(
        admcl.staged_state(&id).unwrap(),
        StagedState::PartiallySigned(1)
    );

    admcl2.sign(&id, 0).unwrap();
    assert_eq!(admcl.staged_state(&id).unwrap(), StagedState::QuorumReached);

    admcl.execute(&id).unwrap();
    assert_eq!(admcl.staged_state(&id).unwrap(), StagedState::Executed);
}

#[test]
fn terminal_and_duplicate_errors() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let id = admcl.add_signer(&adid, admcl2.identity()).unwrap();
    admcl.sign(&id, 0).unwrap();
    assert!(matches!(admcl.sign(&id, 0), Err(AuthError::AlreadySigned)));

    admcl.execute(&id).unwrap();
    assert!(matches!(admcl.execute(&id), Err(AuthError::AlreadyExecuted)));
    assert!(matches!(admcl2.sign(&id, 0), Err(AuthError::AlreadyExecuted)));

    let unknown = InstanceId::derive(b"never proposed");
    assert!(matches!(
        admcl.sign(&unknown, 0),
        Err(AuthError::UnknownTransaction(_))
    ));
    assert!(matches!(
        admcl.execute(&unknown),
        Err(AuthError::UnknownTransaction(_))
    ));
}

#[test]
fn proposals_expire() {
    init_logging();
    let super_admin = PrivateKey::new();
    let ledger = MemoryLedger::new([super_admin.public_key()]);
    let mut admcl = Session::with_signer(ledger.clone(), super_admin)
        .unwrap()
        .with_expiry_rounds(2);

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let id = admcl
        .add_signer(&adid, Signer::Key(PrivateKey::new().public_key()))
        .unwrap();

    // The validity window lapses before anyone signs.
    admcl.wait_propagation(3).unwrap();
    assert!(matches!(admcl.sign(&id, 0), Err(AuthError::Expired)));
    assert!(matches!(admcl.execute(&id), Err(AuthError::Expired)));
    assert_eq!(admcl.staged_state(&id).unwrap(), StagedState::Expired);
}

#[test]
fn outsiders_cannot_propose() {
    let (ledger, mut admcl) = bootstrap();

    let admin = admcl.spawn_root_document().unwrap();
    let adid = admin.base_id();

    let mut outsider = Session::new(ledger.clone()).unwrap();
    assert!(matches!(
        outsider.add_signer(&adid, Signer::Key(PrivateKey::new().public_key())),
        Err(AuthError::RuleViolation)
    ));
}

#[test]
fn threshold_policy_allows_k_of_n() {
    init_logging();
    let super_admin = PrivateKey::new();
    let ledger = MemoryLedger::new([super_admin.public_key()]);
    let mut admcl = Session::with_signer(ledger.clone(), super_admin)
        .unwrap()
        .with_policy(Policy::Threshold(2));

    let mut admcl2 = Session::new(ledger.clone()).unwrap();
    let admcl3 = Session::new(ledger.clone()).unwrap();
    let signers = vec![admcl.identity(), admcl2.identity(), admcl3.identity()];
    let rules = Rules::standard(&Policy::Threshold(2), &signers);
    let admin = admcl.spawn_document(signers, rules).unwrap();
    let adid = admin.base_id();

    // Two of three signatures are enough under the configured threshold.
    let id = admcl
        .add_signer(&adid, Signer::Key(PrivateKey::new().public_key()))
        .unwrap();
    admcl.sign(&id, 0).unwrap();
    assert!(matches!(
        admcl.execute(&id),
        Err(AuthError::QuorumNotReached)
    ));
    admcl2.sign(&id, 1).unwrap();
    admcl.execute(&id).unwrap();

    assert_eq!(admcl.document(&adid).unwrap().signers().len(), 4);
}

#[test]
fn external_submissions_must_be_accounted_for() {
    init_logging();
    let super_admin = PrivateKey::new();
    let ledger = MemoryLedger::new([super_admin.public_key()]);

    // A transaction submitted with the same identity outside any session.
    let signers = vec![Signer::Key(super_admin.public_key())];
    let rules = Rules::standard(&Policy::Unanimous, &signers);
    let args = vec![
        Argument::new("signers", encode_cbor(&signers).unwrap()),
        Argument::new("rules", encode_cbor(&rules).unwrap()),
    ];
    let instruction = Instruction::spawn(
        ledger.genesis().unwrap().instance(),
        DOCUMENT_CONTRACT,
        args,
    )
    .with_counters(vec![1]);
    let mut transaction = Transaction::new(instruction);
    transaction.sign(&super_admin);
    ledger.submit(transaction).unwrap();

    let mut admcl = Session::with_signer(ledger.clone(), super_admin).unwrap();

    // The session's counter has not seen the external write yet.
    assert!(matches!(
        admcl.spawn_root_document(),
        Err(AuthError::Ledger(LedgerError::InvalidCounter {
            expected: 2,
            got: 1
        }))
    ));

    admcl.note_external_submission();
    admcl.spawn_root_document().unwrap();
}

#[test]
fn ledger_failures_are_surfaced() {
    let (ledger, mut admcl) = bootstrap();

    ledger.set_stalled(true);
    assert!(matches!(admcl.wait_propagation(1), Err(AuthError::Timeout)));
    ledger.set_stalled(false);

    ledger.set_unavailable(true);
    assert!(matches!(
        admcl.spawn_root_document(),
        Err(AuthError::Ledger(LedgerError::Unavailable(_)))
    ));
    ledger.set_unavailable(false);

    // Nothing was consumed by the failed attempts.
    admcl.spawn_root_document().unwrap();
}
