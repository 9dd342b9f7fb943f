//! Peer ID allocation seam
//!
//! New peers need cluster-unique IDs. The real allocator lives outside the
//! engine (a distributed unique-ID service); checkers only see this trait.

use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates cluster-unique IDs for new peers
pub trait IdAllocator: Send + Sync {
    /// Allocate the next ID
    fn alloc(&self) -> u64;
}

/// Process-local allocator handing out sequential IDs
///
/// Suitable for tests and single-node deployments only.
#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl SequentialIdAllocator {
    /// Start allocating from `first`
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn alloc(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
