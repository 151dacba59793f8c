//! Process groups and the collective operations this crate needs
//!
//! Every member of a group must call each collective the same number of times
//! and in the same order. Nothing here checks that; a mismatched call sequence
//! deadlocks exactly as it would with MPI.

mod thread;
#[cfg(feature = "mpi")]
mod mpi_group;

pub use thread::ThreadGroup;
#[cfg(feature = "mpi")]
pub use mpi_group::MpiGroup;

/// A set of cooperating processes sharing one partition axis.
pub trait ProcessGroup {
    /// Rank of the calling process inside the group
    fn rank(&self) -> usize;
    /// Number of processes in the group
    fn size(&self) -> usize;
    /// Sum `value` over all members; every member receives the total.
    fn all_reduce_sum(&self, value: f64) -> f64;
}

impl<G: ProcessGroup + ?Sized> ProcessGroup for &G {
    fn rank(&self) -> usize {
        (**self).rank()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        (**self).all_reduce_sum(value)
    }
}

/// The trivial group of one process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialGroup;

impl ProcessGroup for SerialGroup {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        value
    }
}

/// Outcome of an operation that only runs inside its owning process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participation {
    /// The calling process belongs to the group and did the work
    Active,
    /// The calling process is outside the group and returned immediately
    Idle,
}

impl Participation {
    pub fn is_idle(self) -> bool {
        self == Participation::Idle
    }
}
