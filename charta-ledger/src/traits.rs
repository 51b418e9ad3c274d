// SPDX-License-Identifier: MIT OR Apache-2.0

use charta_core::{DocumentId, InstanceId};

use crate::error::LedgerError;
use crate::instance::Instance;
use crate::instruction::Transaction;
use crate::staged::StagedTransaction;

/// Connection to a ledger node.
///
/// Handles are expected to be cheap to clone and safe to share between
/// sessions; the ledger is the only synchronization point of the whole
/// workflow, so none of these methods require exclusive access.
///
/// Propagation is not instantaneous: a read depending on a very recent write
/// must be preceded by [`Ledger::wait_propagation`], the ledger gives no
/// read-your-own-write guarantee.
pub trait Ledger {
    /// Submit a signed transaction.
    fn submit(&self, transaction: Transaction) -> Result<(), LedgerError>;

    /// Random read of an instance by identifier.
    fn fetch(&self, id: &InstanceId) -> Result<Instance, LedgerError>;

    /// Read a staged transaction by identifier.
    fn fetch_staged(&self, id: &InstanceId) -> Result<StagedTransaction, LedgerError>;

    /// Resolve an instance bound under a well-known name of a document scope.
    fn resolve_name(&self, scope: &DocumentId, name: &str) -> Result<InstanceId, LedgerError>;

    /// Block until the ledger reports `rounds` further rounds of state
    /// propagation.
    fn wait_propagation(&self, rounds: u64) -> Result<(), LedgerError>;

    /// Identifiers of all staged transactions known to the ledger, in ledger
    /// order. Supports discovery by actors who did not originate a proposal.
    fn staged_ids(&self) -> Result<Vec<InstanceId>, LedgerError>;

    /// Current propagation round, used to judge staged-transaction expiry.
    fn current_round(&self) -> Result<u64, LedgerError>;

    /// Base identifier of the genesis document, the root authorization scope.
    fn genesis(&self) -> Result<DocumentId, LedgerError>;
}
