// ============================================================================
// Entity Identifiers
// ============================================================================
//
// Server-assigned ids are positive. Optimistic placeholders get negative ids
// from a monotonic counter so two creates can never share one, however close
// together they are issued.
//
// ============================================================================

use std::sync::atomic::{AtomicI64, Ordering};

pub type EntityId = i64;

/// Process-wide source of temporary ids.
static NEXT_TEMP_ID: AtomicI64 = AtomicI64::new(-1);

#[derive(Debug, Default, Clone, Copy)]
pub struct TempIdAllocator;

impl TempIdAllocator {
    pub fn new() -> Self {
        Self
    }

    /// Allocate a fresh placeholder id (strictly decreasing, always < 0).
    pub fn next(&self) -> EntityId {
        NEXT_TEMP_ID.fetch_sub(1, Ordering::SeqCst)
    }
}

/// Placeholders are the only entities with non-positive ids.
pub fn is_temporary(id: EntityId) -> bool {
    id <= 0
}
