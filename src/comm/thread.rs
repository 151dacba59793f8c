//! Shared-memory process group: ranks are threads of one process
//!
//! Used to run several cooperating "processes" inside a single binary, e.g. to
//! check that a result does not depend on how the grid is split.

use super::ProcessGroup;
use std::sync::{Arc, Barrier, Mutex};

struct Shared {
    size: usize,
    barrier: Barrier,
    slots: Mutex<Vec<f64>>,
}

/// Handle held by one rank. Create all handles with [`ThreadGroup::create`]
/// and move each into its own thread.
#[derive(Clone)]
pub struct ThreadGroup {
    rank: usize,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ThreadGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGroup")
            .field("rank", &self.rank)
            .field("size", &self.shared.size)
            .finish()
    }
}

impl ThreadGroup {
    /// One handle per rank, in rank order.
    pub fn create(size: usize) -> Vec<ThreadGroup> {
        assert!(size > 0, "a process group needs at least one member");
        let shared = Arc::new(Shared {
            size,
            barrier: Barrier::new(size),
            slots: Mutex::new(vec![0.0; size]),
        });
        (0..size)
            .map(|rank| ThreadGroup {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl ProcessGroup for ThreadGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        if self.shared.size == 1 {
            return value;
        }
        // A poisoned lock means another rank panicked mid-collective; the data
        // is plain floats so keep going and let the panic surface on join.
        self.shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())[self.rank] = value;
        self.shared.barrier.wait();
        // Summed in rank order so every member gets the bit-identical total
        let total = self
            .shared
            .slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .sum();
        // Slots may not be reused until everyone has read them
        self.shared.barrier.wait();
        total
    }
}
