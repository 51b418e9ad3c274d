// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use charta_core::cbor::encode_cbor;
use charta_core::{DocumentId, InstanceId, PublicKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expression::Expression;

/// Base signing expression of a document, resolved when other documents
/// reference it as a signer.
pub const ACTION_SIGN: &str = "_sign";

/// Evolve a document to its next version.
pub const ACTION_EVOLVE: &str = "invoke:evolve";

/// Spawn a new document governed by this scope.
pub const ACTION_SPAWN_DOCUMENT: &str = "spawn:document";

/// Stage a proposal against this scope.
pub const ACTION_SPAWN_STAGED: &str = "spawn:staged";

/// Spawn an access-right record governed by this scope.
pub const ACTION_SPAWN_ACCESS_RIGHT: &str = "spawn:accessright";

/// Update an access-right record governed by this scope.
pub const ACTION_UPDATE: &str = "invoke:update";

/// Bind an instance under a well-known name of this scope.
pub const ACTION_BIND: &str = "invoke:bind";

/// Actions which require the collective quorum of the signer set. Rebuilt
/// from the active policy whenever the signer set changes.
const COLLECTIVE_ACTIONS: &[&str] = &[
    ACTION_SIGN,
    ACTION_EVOLVE,
    ACTION_SPAWN_DOCUMENT,
    ACTION_SPAWN_ACCESS_RIGHT,
    ACTION_UPDATE,
];

/// Actions any single signer may perform on their own.
const MEMBER_ACTIONS: &[&str] = &[ACTION_SPAWN_STAGED, ACTION_BIND];

/// An identity authorized to sign actions: a public key or a reference to
/// another authorization document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Signer {
    Key(PublicKey),
    Document(DocumentId),
}

impl From<PublicKey> for Signer {
    fn from(value: PublicKey) -> Self {
        Signer::Key(value)
    }
}

impl From<DocumentId> for Signer {
    fn from(value: DocumentId) -> Self {
        Signer::Document(value)
    }
}

impl fmt::Display for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signer::Key(public_key) => write!(f, "key:{public_key}"),
            Signer::Document(id) => write!(f, "document:{id}"),
        }
    }
}

/// How the collective rules of a document are derived from its signer set.
///
/// Unanimity over the current signers is the default; a k-of-n threshold can
/// be configured instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Policy {
    #[default]
    Unanimous,
    Threshold(usize),
}

impl Policy {
    /// The collective rule over a signer roster under this policy.
    pub fn rule(&self, signers: &[Signer]) -> Expression {
        match self {
            Policy::Unanimous => Expression::all_of(signers.iter().copied()),
            Policy::Threshold(threshold) => {
                Expression::threshold_of(*threshold, signers.iter().copied())
            }
        }
    }
}

/// Mapping from action names to the rule expressions governing them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rules(BTreeMap<String, Expression>);

impl Rules {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with_rule(mut self, action: impl Into<String>, expression: Expression) -> Self {
        self.set(action, expression);
        self
    }

    pub fn set(&mut self, action: impl Into<String>, expression: Expression) {
        self.0.insert(action.into(), expression);
    }

    pub fn get(&self, action: &str) -> Option<&Expression> {
        self.0.get(action)
    }

    pub fn contains(&self, action: &str) -> bool {
        self.0.contains_key(action)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Expression)> {
        self.0.iter()
    }

    /// Standard rule set over a signer roster: collective actions follow the
    /// quorum policy, staging and binding are open to any single member.
    pub fn standard(policy: &Policy, signers: &[Signer]) -> Self {
        let collective = policy.rule(signers);
        let member = Expression::any_of(signers.iter().copied());
        let mut rules = Rules::new();
        for action in COLLECTIVE_ACTIONS {
            rules.set(*action, collective.clone());
        }
        for action in MEMBER_ACTIONS {
            rules.set(*action, member.clone());
        }
        rules
    }

    /// Rebuild the roster-derived rules for a changed signer set, leaving any
    /// custom rules untouched.
    fn rebuild(&mut self, policy: &Policy, signers: &[Signer]) {
        let collective = policy.rule(signers);
        let member = Expression::any_of(signers.iter().copied());
        for action in COLLECTIVE_ACTIONS {
            if self.contains(action) {
                self.set(*action, collective.clone());
            }
        }
        for action in MEMBER_ACTIONS {
            if self.contains(action) {
                self.set(*action, member.clone());
            }
        }
    }
}

/// A versioned, self-governing authorization document.
///
/// The base identifier is assigned at creation and never changes; every
/// committed mutation increments the version in place. A document is
/// self-governing: changing its signers or rules must satisfy the *current*
/// version's evolve rule, which is why evolution always goes through a staged
/// transaction and never mutates directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    base_id: DocumentId,
    version: u64,
    signers: Vec<Signer>,
    rules: Rules,
}

impl Document {
    /// Document at version 0 with an externally assigned base identifier
    /// (normally derived from the instruction which spawned it).
    pub fn new(base_id: DocumentId, signers: Vec<Signer>, rules: Rules) -> Self {
        Self {
            base_id,
            version: 0,
            signers,
            rules,
        }
    }

    /// Document at version 0 with a base identifier derived from its initial
    /// content. Used for genesis documents created outside any instruction.
    pub fn create(signers: Vec<Signer>, rules: Rules) -> Self {
        let bytes = encode_cbor(&(&signers, &rules))
            .expect("CBOR encoder failed due to a critical IO error");
        Self::new(DocumentId::from(InstanceId::derive(bytes)), signers, rules)
    }

    pub fn base_id(&self) -> DocumentId {
        self.base_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn signers(&self) -> &[Signer] {
        &self.signers
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn signer_set(&self) -> HashSet<Signer> {
        self.signers.iter().copied().collect()
    }

    pub fn has_signer(&self, signer: &Signer) -> bool {
        self.signers.contains(signer)
    }

    /// The next version with the given signers and rules, same base
    /// identifier.
    pub fn evolved(&self, signers: Vec<Signer>, rules: Rules) -> Document {
        Document {
            base_id: self.base_id,
            version: self.version + 1,
            signers,
            rules,
        }
    }

    /// Next version with an added signer, roster-derived rules rebuilt under
    /// the given policy.
    pub fn with_signer_added(
        &self,
        signer: Signer,
        policy: &Policy,
    ) -> Result<Document, DocumentError> {
        if self.has_signer(&signer) {
            return Err(DocumentError::DuplicateSigner(signer));
        }
        let mut signers = self.signers.clone();
        signers.push(signer);
        Ok(self.rebuilt(signers, policy))
    }

    /// Next version with a removed signer.
    pub fn with_signer_removed(
        &self,
        signer: &Signer,
        policy: &Policy,
    ) -> Result<Document, DocumentError> {
        let mut signers = self.signers.clone();
        let position = signers
            .iter()
            .position(|candidate| candidate == signer)
            .ok_or(DocumentError::UnknownSigner(*signer))?;
        signers.remove(position);
        if signers.is_empty() {
            return Err(DocumentError::EmptySignerSet);
        }
        Ok(self.rebuilt(signers, policy))
    }

    /// Next version with one signer replaced in place, e.g. for key rotation.
    pub fn with_signer_replaced(
        &self,
        outgoing: &Signer,
        incoming: Signer,
        policy: &Policy,
    ) -> Result<Document, DocumentError> {
        if self.has_signer(&incoming) {
            return Err(DocumentError::DuplicateSigner(incoming));
        }
        let mut signers = self.signers.clone();
        let position = signers
            .iter()
            .position(|candidate| candidate == outgoing)
            .ok_or(DocumentError::UnknownSigner(*outgoing))?;
        signers[position] = incoming;
        Ok(self.rebuilt(signers, policy))
    }

    fn rebuilt(&self, signers: Vec<Signer>, policy: &Policy) -> Document {
        let mut rules = self.rules.clone();
        rules.rebuild(policy, &signers);
        self.evolved(signers, rules)
    }
}

/// Errors raised when deriving the next version of a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("signer {0} is already present")]
    DuplicateSigner(Signer),

    #[error("signer {0} is not present")]
    UnknownSigner(Signer),

    #[error("a document must keep at least one signer")]
    EmptySignerSet,
}

#[cfg(test)]
mod tests {
    use charta_core::PrivateKey;

    use super::{ACTION_EVOLVE, ACTION_SPAWN_STAGED, Document, DocumentError, Policy, Rules, Signer};
    use crate::expression::Expression;

    fn keys(n: usize) -> Vec<Signer> {
        (0..n)
            .map(|_| Signer::Key(PrivateKey::new().public_key()))
            .collect()
    }

    #[test]
    fn version_increases_and_base_id_is_stable() {
        let signers = keys(1);
        let document = Document::create(signers.clone(), Rules::standard(&Policy::Unanimous, &signers));
        assert_eq!(document.version(), 0);

        let extra = keys(1)[0];
        let evolved = document
            .with_signer_added(extra, &Policy::Unanimous)
            .unwrap();
        assert_eq!(evolved.version(), 1);
        assert_eq!(evolved.base_id(), document.base_id());

        let evolved_again = evolved
            .with_signer_removed(&extra, &Policy::Unanimous)
            .unwrap();
        assert_eq!(evolved_again.version(), 2);
        assert_eq!(evolved_again.base_id(), document.base_id());
    }

    #[test]
    fn signer_changes_rebuild_collective_rules() {
        let signers = keys(2);
        let document = Document::create(signers.clone(), Rules::standard(&Policy::Unanimous, &signers));

        let extra = keys(1)[0];
        let evolved = document
            .with_signer_added(extra, &Policy::Unanimous)
            .unwrap();
        assert_eq!(
            evolved.rules().get(ACTION_EVOLVE),
            Some(&Expression::all_of(evolved.signers().iter().copied()))
        );
        assert_eq!(
            evolved.rules().get(ACTION_SPAWN_STAGED),
            Some(&Expression::any_of(evolved.signers().iter().copied()))
        );
    }

    #[test]
    fn threshold_policy_rebuild() {
        let signers = keys(3);
        let document = Document::create(
            signers.clone(),
            Rules::standard(&Policy::Threshold(2), &signers),
        );
        let extra = keys(1)[0];
        let evolved = document
            .with_signer_added(extra, &Policy::Threshold(2))
            .unwrap();
        assert_eq!(
            evolved.rules().get(ACTION_EVOLVE),
            Some(&Expression::threshold_of(
                2,
                evolved.signers().iter().copied()
            ))
        );
    }

    #[test]
    fn custom_rules_survive_signer_changes() {
        let signers = keys(2);
        let outsider = keys(1)[0];
        let rules = Rules::standard(&Policy::Unanimous, &signers)
            .with_rule("invoke:audit", Expression::any_of([outsider]));
        let document = Document::create(signers, rules);

        let evolved = document
            .with_signer_added(keys(1)[0], &Policy::Unanimous)
            .unwrap();
        assert_eq!(
            evolved.rules().get("invoke:audit"),
            Some(&Expression::any_of([outsider]))
        );
    }

    #[test]
    fn replace_keeps_roster_position() {
        let signers = keys(3);
        let incoming = keys(1)[0];
        let document = Document::create(signers.clone(), Rules::standard(&Policy::Unanimous, &signers));

        let evolved = document
            .with_signer_replaced(&signers[1], incoming, &Policy::Unanimous)
            .unwrap();
        assert_eq!(evolved.signers()[1], incoming);
        assert_eq!(evolved.signers().len(), 3);
    }

    #[test]
    fn signer_change_errors() {
        let signers = keys(1);
        let document = Document::create(signers.clone(), Rules::standard(&Policy::Unanimous, &signers));

        assert!(matches!(
            document.with_signer_added(signers[0], &Policy::Unanimous),
            Err(DocumentError::DuplicateSigner(_))
        ));
        assert!(matches!(
            document.with_signer_removed(&keys(1)[0], &Policy::Unanimous),
            Err(DocumentError::UnknownSigner(_))
        ));
        assert!(matches!(
            document.with_signer_removed(&signers[0], &Policy::Unanimous),
            Err(DocumentError::EmptySignerSet)
        ));
    }
}
