//! Thin façade over the collective the adaptation loop needs: a logical-or
//! reduction of one flag across every partition.
//!
//! Three backends are provided:
//! - [`NoComm`] for serial runs (the reduction is the identity),
//! - [`ThreadComm`] for partitions living on threads of one process,
//! - `MpiComm` (feature `mpi-support`) for partitions on separate ranks.

use crate::mesh_error::MeshAmrError;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Collective operations across spatial partitions.
pub trait Communicator {
    /// Rank of this partition in `0..size()`.
    fn rank(&self) -> usize;
    /// Number of participating partitions.
    fn size(&self) -> usize;
    /// Returns `true` on every partition iff `local` is `true` on at least
    /// one. Every partition must call this the same number of times.
    fn all_reduce_or(&self, local: bool) -> Result<bool, MeshAmrError>;
}

/// Compile-time no-op comm for pure serial runs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_or(&self, local: bool) -> Result<bool, MeshAmrError> {
        Ok(local)
    }
}

// --- ThreadComm: intra-process / multi-thread ---

#[derive(Debug, Default)]
struct Round {
    arrived: usize,
    acc: bool,
    result: bool,
    generation: u64,
    /// Members dropped so far; any departure poisons the group.
    left: usize,
}

#[derive(Debug)]
struct Shared {
    size: usize,
    round: Mutex<Round>,
    cond: Condvar,
}

/// One member of a group of partitions that live on threads of the same
/// process. Each member must be driven from its own thread.
///
/// Dropping a member ends the group: the other members get
/// [`MeshAmrError::Collective`] instead of waiting for it forever.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl ThreadComm {
    /// Create the `size` members of a new group, ordered by rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            size: size.max(1),
            round: Mutex::new(Round::default()),
            cond: Condvar::new(),
        });
        (0..size.max(1))
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_reduce_or(&self, local: bool) -> Result<bool, MeshAmrError> {
        let mut round = self.shared.round.lock();
        if round.left > 0 {
            return Err(departed(round.left, self.shared.size));
        }
        let generation = round.generation;
        round.acc |= local;
        round.arrived += 1;
        if round.arrived == self.shared.size {
            round.result = round.acc;
            round.acc = false;
            round.arrived = 0;
            round.generation = round.generation.wrapping_add(1);
            self.shared.cond.notify_all();
            return Ok(round.result);
        }
        // The next round cannot complete before this member joins it, so
        // `result` still holds this round's value on wake-up.
        while round.generation == generation {
            if round.left > 0 {
                return Err(departed(round.left, self.shared.size));
            }
            self.shared.cond.wait(&mut round);
        }
        Ok(round.result)
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        let mut round = self.shared.round.lock();
        round.left += 1;
        self.shared.cond.notify_all();
    }
}

fn departed(left: usize, size: usize) -> MeshAmrError {
    MeshAmrError::Collective(format!("{left} of {size} thread members left the group"))
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    /// Partitions distributed over the ranks of an MPI communicator.
    pub struct MpiComm {
        world: SimpleCommunicator,
    }

    impl MpiComm {
        /// Wrap a communicator obtained from an initialised MPI universe.
        pub fn new(world: SimpleCommunicator) -> Self {
            Self { world }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn all_reduce_or(&self, local: bool) -> Result<bool, MeshAmrError> {
            let local = i32::from(local);
            let mut global = 0i32;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::max());
            Ok(global != 0)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;
