// SPDX-License-Identifier: MIT OR Apache-2.0

//! Names of the ledger contracts and commands the workflow relies on.

/// Contract holding authorization documents.
pub const DOCUMENT_CONTRACT: &str = "document";

/// Contract holding staged (deferred) transactions.
pub const STAGED_CONTRACT: &str = "staged";

/// Contract holding per-project access-right records.
pub const ACCESS_RIGHT_CONTRACT: &str = "accessright";

/// Evolve a document in place to its next version.
pub const CMD_EVOLVE: &str = "evolve";

/// Append a signature to a staged transaction.
pub const CMD_ACCEPT: &str = "accept";

/// Commit a staged transaction, applying its proposed instruction.
pub const CMD_COMMIT: &str = "commit";

/// Update the grants of an access-right record.
pub const CMD_UPDATE: &str = "update";

/// Bind an instance under a well-known name of a document scope.
pub const CMD_BIND: &str = "bind";
