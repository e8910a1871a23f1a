//! Run-wide identifiers for tree nodes and their preview artefacts.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out identifiers that never repeat within one run.
///
/// The allocator is passed explicitly into every build call. Implementations
/// must be safe to share between threads because sibling subtrees may be
/// built in parallel.
pub trait IdAllocator: Sync {
    fn next_id(&self) -> u64;
}

/// Monotonic counter shared by the whole tree build.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Number of identifiers handed out so far (for a counter started at 0).
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl IdAllocator for SequentialIds {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_ids_increase() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.issued(), 3);
    }

    #[test]
    fn test_sequential_ids_unique_across_threads() {
        let ids = SequentialIds::starting_at(10);
        let seen: Vec<u64> = (0..1000).into_par_iter().map(|_| ids.next_id()).collect();
        let unique: HashSet<u64> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 1000);
        assert_eq!(*seen.iter().min().unwrap(), 10);
        assert_eq!(*seen.iter().max().unwrap(), 1009);
    }
}
