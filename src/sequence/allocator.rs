//! Atomic sequence number allocation.
//!
//! A plain "read current max, add one, write" pattern loses numbers under
//! concurrency. Allocation is a single `fetch_add` on an atomic counter; the
//! store invokes it while holding its commit lock, and ticket insertion after
//! allocation is infallible, which keeps the issued range contiguous.

use std::sync::atomic::{AtomicU64, Ordering};

/// Interface over the atomic allocation primitive. Production deployments
/// backed by a database would implement this with a database sequence.
pub trait SequenceAllocator: Send + Sync {
    /// Allocate and return the next sequence number. Numbers start at 1.
    fn allocate(&self) -> u64;

    /// The highest number allocated so far (0 if none).
    fn current(&self) -> u64;
}

/// In-process allocator over an `AtomicU64`.
pub struct AtomicSequenceAllocator {
    counter: AtomicU64,
}

impl AtomicSequenceAllocator {
    /// Create an allocator that resumes after `highest_issued`.
    pub fn starting_after(highest_issued: u64) -> Self {
        Self {
            counter: AtomicU64::new(highest_issued),
        }
    }
}

impl Default for AtomicSequenceAllocator {
    fn default() -> Self {
        Self::starting_after(0)
    }
}

impl SequenceAllocator for AtomicSequenceAllocator {
    fn allocate(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_sequential_allocation() {
        let allocator = AtomicSequenceAllocator::default();
        assert_eq!(allocator.allocate(), 1);
        assert_eq!(allocator.allocate(), 2);
        assert_eq!(allocator.current(), 2);
    }

    #[test]
    fn test_resume_after_highest() {
        let allocator = AtomicSequenceAllocator::starting_after(41);
        assert_eq!(allocator.allocate(), 42);
    }

    #[test]
    fn test_concurrent_allocation_is_gap_free() {
        let allocator = Arc::new(AtomicSequenceAllocator::default());
        let mut handles = vec![];

        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| allocator.allocate()).collect::<Vec<u64>>()
            }));
        }

        let mut numbers: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        numbers.sort_unstable();

        let unique: HashSet<u64> = numbers.iter().copied().collect();
        assert_eq!(unique.len(), 2000);
        assert_eq!(numbers.first(), Some(&1));
        assert_eq!(numbers.last(), Some(&2000));
    }
}
