// ============================================================================
// Entity Read Hooks
// ============================================================================
//
// Read-only projections of the query cache for a UI: typed readers, their
// non-blocking `peek_*` counterparts and lookups derived from cached data.
// Nothing here writes to the backend.
//
// ============================================================================

pub mod feed;
pub mod queries;

pub use feed::TransactionFeed;
pub use queries::Queries;
