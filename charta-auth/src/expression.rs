// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::HashSet;

use charta_core::DocumentId;
use serde::{Deserialize, Serialize};

use crate::document::Signer;

/// How deep nested document references are followed during evaluation.
const MAX_RESOLVE_DEPTH: usize = 8;

/// A rule expression over signer identities.
///
/// Expressions are evaluated structurally against the set of identities which
/// signed an action. A [`Signer::Document`] leaf delegates to another
/// document: it is satisfied when the set satisfies that document's signing
/// expression, which allows "any member of this sub-group" style policies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    /// Satisfied when this identity is present (or, for document references,
    /// when the referenced document's signing expression is satisfied).
    Signer(Signer),

    /// Satisfied when all children are satisfied. Never satisfied when empty.
    And(Vec<Expression>),

    /// Satisfied when at least one child is satisfied.
    Or(Vec<Expression>),

    /// Satisfied when at least `threshold` members are satisfied.
    Threshold {
        threshold: usize,
        members: Vec<Expression>,
    },
}

impl Expression {
    /// Unanimous conjunction over the given identities.
    pub fn all_of<I>(signers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Signer>,
    {
        Expression::And(
            signers
                .into_iter()
                .map(|signer| Expression::Signer(signer.into()))
                .collect(),
        )
    }

    /// Any-one disjunction over the given identities.
    pub fn any_of<I>(signers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Signer>,
    {
        Expression::Or(
            signers
                .into_iter()
                .map(|signer| Expression::Signer(signer.into()))
                .collect(),
        )
    }

    /// k-of-n threshold over the given identities.
    pub fn threshold_of<I>(threshold: usize, signers: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Signer>,
    {
        Expression::Threshold {
            threshold,
            members: signers
                .into_iter()
                .map(|signer| Expression::Signer(signer.into()))
                .collect(),
        }
    }

    /// Number of top-level clauses, the valid signature slots of this rule.
    pub fn clause_count(&self) -> usize {
        match self {
            Expression::Signer(_) => 1,
            Expression::And(children) | Expression::Or(children) => children.len(),
            Expression::Threshold { members, .. } => members.len(),
        }
    }

    /// Evaluate against a set of present identities, treating document
    /// references as plain membership.
    pub fn evaluate(&self, present: &HashSet<Signer>) -> bool {
        self.evaluate_at(present, &|_: &DocumentId| None::<Expression>, MAX_RESOLVE_DEPTH)
    }

    /// Evaluate against a set of present identities, following document
    /// references through the given resolver.
    ///
    /// The resolver returns the signing expression of the referenced document,
    /// or `None` when the document cannot be resolved (an unresolvable
    /// reference is never satisfied).
    pub fn evaluate_with<F>(&self, present: &HashSet<Signer>, resolve: &F) -> bool
    where
        F: Fn(&DocumentId) -> Option<Expression>,
    {
        self.evaluate_at(present, resolve, MAX_RESOLVE_DEPTH)
    }

    fn evaluate_at<F>(&self, present: &HashSet<Signer>, resolve: &F, depth: usize) -> bool
    where
        F: Fn(&DocumentId) -> Option<Expression>,
    {
        match self {
            Expression::Signer(signer) => {
                if present.contains(signer) {
                    return true;
                }
                let Signer::Document(id) = signer else {
                    return false;
                };
                if depth == 0 {
                    return false;
                }
                match resolve(id) {
                    Some(expression) => expression.evaluate_at(present, resolve, depth - 1),
                    None => false,
                }
            }
            Expression::And(children) => {
                !children.is_empty()
                    && children
                        .iter()
                        .all(|child| child.evaluate_at(present, resolve, depth))
            }
            Expression::Or(children) => children
                .iter()
                .any(|child| child.evaluate_at(present, resolve, depth)),
            Expression::Threshold { threshold, members } => {
                *threshold > 0
                    && members
                        .iter()
                        .filter(|member| member.evaluate_at(present, resolve, depth))
                        .count()
                        >= *threshold
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use charta_core::{DocumentId, InstanceId, PrivateKey};

    use super::Expression;
    use crate::document::Signer;

    fn keys(n: usize) -> Vec<Signer> {
        (0..n)
            .map(|_| Signer::Key(PrivateKey::new().public_key()))
            .collect()
    }

    fn present(signers: &[Signer]) -> HashSet<Signer> {
        signers.iter().copied().collect()
    }

    #[test]
    fn unanimous_and() {
        let signers = keys(3);
        let rule = Expression::all_of(signers.iter().copied());

        assert!(rule.evaluate(&present(&signers)));
        assert!(!rule.evaluate(&present(&signers[..2])));
        assert!(!rule.evaluate(&HashSet::new()));
    }

    #[test]
    fn any_one_or() {
        let signers = keys(3);
        let rule = Expression::any_of(signers.iter().copied());

        assert!(rule.evaluate(&present(&signers[..1])));
        assert!(!rule.evaluate(&HashSet::new()));
    }

    #[test]
    fn empty_and_is_never_satisfied() {
        let rule = Expression::And(vec![]);
        assert!(!rule.evaluate(&present(&keys(1))));
    }

    #[test]
    fn threshold() {
        let signers = keys(4);
        let rule = Expression::threshold_of(2, signers.iter().copied());

        assert!(!rule.evaluate(&present(&signers[..1])));
        assert!(rule.evaluate(&present(&signers[..2])));
        assert!(rule.evaluate(&present(&signers)));

        let degenerate = Expression::threshold_of(0, signers.iter().copied());
        assert!(!degenerate.evaluate(&present(&signers)));
    }

    #[test]
    fn nested_or_of_sub_groups() {
        // Two sub-groups, any one of which may authorize ("any super-admin
        // hospital group").
        let group_a = DocumentId::from(InstanceId::derive(b"group a"));
        let group_b = DocumentId::from(InstanceId::derive(b"group b"));
        let members_a = keys(2);
        let members_b = keys(2);

        let mut expressions = HashMap::new();
        expressions.insert(group_a, Expression::all_of(members_a.iter().copied()));
        expressions.insert(group_b, Expression::all_of(members_b.iter().copied()));
        let resolve = |id: &DocumentId| expressions.get(id).cloned();

        let rule = Expression::any_of([group_a, group_b]);
        assert!(rule.evaluate_with(&present(&members_a), &resolve));
        assert!(rule.evaluate_with(&present(&members_b), &resolve));
        assert!(!rule.evaluate_with(&present(&members_a[..1]), &resolve));

        // Without a resolver the reference alone is not enough.
        assert!(!rule.evaluate(&present(&members_a)));
        // A signature made directly under the group identity still counts.
        assert!(rule.evaluate(&present(&[Signer::Document(group_a)])));
    }

    #[test]
    fn unresolvable_reference_is_never_satisfied() {
        let unknown = DocumentId::from(InstanceId::derive(b"unknown"));
        let rule = Expression::any_of([unknown]);
        assert!(!rule.evaluate_with(&present(&keys(2)), &|_| None::<Expression>));
    }

    #[test]
    fn cyclic_references_terminate() {
        let group = DocumentId::from(InstanceId::derive(b"cycle"));
        let rule = Expression::any_of([group]);
        let resolve = |_: &DocumentId| Some(Expression::any_of([group]));
        assert!(!rule.evaluate_with(&HashSet::new(), &resolve));
    }

    #[test]
    fn clause_counts() {
        let signers = keys(3);
        assert_eq!(Expression::all_of(signers.iter().copied()).clause_count(), 3);
        assert_eq!(Expression::Signer(signers[0]).clause_count(), 1);
        assert_eq!(
            Expression::threshold_of(2, signers.iter().copied()).clause_count(),
            3
        );
    }
}
