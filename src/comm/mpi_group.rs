//! MPI-backed process group

use super::ProcessGroup;
use mpi::collective::SystemOperation;
use mpi::topology::{Communicator, SimpleCommunicator};
use mpi::traits::*;

/// A process group backed by an MPI communicator.
pub struct MpiGroup {
    comm: SimpleCommunicator,
}

impl MpiGroup {
    pub fn new(comm: SimpleCommunicator) -> Self {
        MpiGroup { comm }
    }
}

impl ProcessGroup for MpiGroup {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn all_reduce_sum(&self, value: f64) -> f64 {
        let mut total = 0.0f64;
        self.comm
            .all_reduce_into(&value, &mut total, SystemOperation::sum());
        total
    }
}
