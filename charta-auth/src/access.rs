// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{BTreeMap, BTreeSet};

use charta_core::DocumentId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known name an access-right record is bound under on its project, so
/// lookups never need to track raw instance identifiers.
pub const ACCESS_RIGHT_NAME: &str = "AR";

/// Per-project mapping from querier identifiers to their permitted actions.
///
/// Spawned once per project and then mutated in place through staged
/// transactions; never implicitly deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRight {
    /// Base identifier of the owning project document.
    pub project: DocumentId,

    grants: BTreeMap<String, BTreeSet<String>>,
}

impl AccessRight {
    pub fn new(project: DocumentId) -> Self {
        Self {
            project,
            grants: BTreeMap::new(),
        }
    }

    /// Add actions to a querier's grant set (set union, additive only).
    pub fn grant(&mut self, querier: &str, actions: impl IntoIterator<Item = String>) {
        self.grants
            .entry(querier.to_string())
            .or_default()
            .extend(actions);
    }

    /// Replace a querier's grant set with exactly the given actions.
    pub fn set(&mut self, querier: &str, actions: impl IntoIterator<Item = String>) {
        self.grants
            .insert(querier.to_string(), actions.into_iter().collect());
    }

    /// Drop all grants of a querier. Returns whether the querier was known.
    pub fn revoke(&mut self, querier: &str) -> bool {
        self.grants.remove(querier).is_some()
    }

    /// The actions granted to a querier, if any.
    pub fn actions(&self, querier: &str) -> Option<&BTreeSet<String>> {
        self.grants.get(querier)
    }

    /// Whether the querier may perform the action. Fails for queriers which
    /// were never granted anything on this project.
    pub fn is_authorized(&self, querier: &str, action: &str) -> Result<bool, AccessRightError> {
        match self.grants.get(querier) {
            Some(actions) => Ok(actions.contains(action)),
            None => Err(AccessRightError::UnknownQuerier(querier.to_string())),
        }
    }

    pub fn queriers(&self) -> impl Iterator<Item = &String> {
        self.grants.keys()
    }
}

#[derive(Debug, Error)]
pub enum AccessRightError {
    #[error("querier \"{0}\" has no grants on this project")]
    UnknownQuerier(String),
}

#[cfg(test)]
mod tests {
    use charta_core::{DocumentId, InstanceId};

    use super::{AccessRight, AccessRightError};

    fn record() -> AccessRight {
        AccessRight::new(DocumentId::from(InstanceId::derive(b"project")))
    }

    fn actions(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn grant_unions_existing_actions() {
        let mut record = record();
        record.grant("1:1", actions(&["count_global"]));
        record.grant("1:1", actions(&["count_per_site_shuffled"]));

        assert!(record.is_authorized("1:1", "count_global").unwrap());
        assert!(record.is_authorized("1:1", "count_per_site_shuffled").unwrap());
    }

    #[test]
    fn set_replaces_existing_actions() {
        let mut record = record();
        record.grant("1:1", actions(&["count_global"]));
        record.set("1:1", actions(&["count_per_site_shuffled"]));

        assert!(!record.is_authorized("1:1", "count_global").unwrap());
        assert!(record.is_authorized("1:1", "count_per_site_shuffled").unwrap());
    }

    #[test]
    fn unknown_querier_is_an_error() {
        let record = record();
        assert!(matches!(
            record.is_authorized("2:1", "count_global"),
            Err(AccessRightError::UnknownQuerier(querier)) if querier == "2:1"
        ));
    }

    #[test]
    fn revoke_drops_the_querier() {
        let mut record = record();
        record.grant("1:1", actions(&["count_global"]));

        assert!(record.revoke("1:1"));
        assert!(!record.revoke("1:1"));
        assert!(record.is_authorized("1:1", "count_global").is_err());
    }
}
