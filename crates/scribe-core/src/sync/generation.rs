//! Store generations
//!
//! Every store switch advances a shared counter. Background work captures a
//! [`Lease`] when it is spawned and checks it before each side effect; once
//! the store has been switched again the lease is stale and the work is
//! abandoned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter of store switches
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Invalidate all outstanding leases; returns the new generation
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Lease on the current generation
    pub fn lease(&self) -> Lease {
        Lease {
            counter: Arc::clone(&self.0),
            generation: self.current(),
        }
    }
}

/// Proof that work was started for a particular generation
#[derive(Debug, Clone)]
pub struct Lease {
    counter: Arc<AtomicU64>,
    generation: u64,
}

impl Lease {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no switch happened since the lease was taken
    pub fn is_current(&self) -> bool {
        self.counter.load(Ordering::SeqCst) == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_invalidates_leases() {
        let generation = Generation::new();
        let lease = generation.lease();
        assert!(lease.is_current());

        assert_eq!(generation.advance(), 1);
        assert!(!lease.is_current());
        assert!(generation.lease().is_current());
    }

    #[test]
    fn test_clones_share_counter() {
        let generation = Generation::new();
        let lease = generation.clone().lease();
        generation.advance();
        assert!(!lease.is_current());
        assert_eq!(lease.generation(), 0);
    }
}
