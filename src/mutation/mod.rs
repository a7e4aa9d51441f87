// ============================================================================
// Optimistic Mutation Module
// ============================================================================
//
// Writes against the backend that keep the query cache coherent: speculate,
// commit, then reconcile or roll back. See `controller` for the protocol and
// `change` for the reversible cache edits it is built on.
//
// ============================================================================

pub mod accounts;
pub mod categories;
pub mod change;
pub mod controller;
pub mod rules;
pub mod statements;
pub mod transactions;

pub use change::{Edit, Position, Reconcile, Undo};
pub use controller::{MutationController, MutationPlan};
pub use rules::{RuleUpdate, UpdatedRule};
pub use statements::ImportOutcome;
pub use transactions::BulkDeleteReport;
