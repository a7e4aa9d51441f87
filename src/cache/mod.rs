// ============================================================================
// Query Cache Module
// ============================================================================
//
// Process-wide keyed store of remote results with staleness windows,
// in-flight de-duplication, cancellation, invalidation and idle-time garbage
// collection. The cache is an explicit service object: the owner creates it,
// injects it where needed and clears it on logout.
//
// ============================================================================

pub mod entry;
pub mod key;
pub mod retry;
pub mod store;

pub use entry::{CacheEvent, EntryInfo, EntryStatus, Fetcher, NotReady};
pub use key::{CacheKey, KeyFilter};
pub use retry::RetryPolicy;
pub use store::{QueryCache, Subscription};
