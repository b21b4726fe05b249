//! MPI-backed communicator for the N-file coordination protocol.
//!
//! Wraps an owned [`SimpleCommunicator`] behind the [`Comm`] trait so the
//! session state machines in `nfio-core` run unchanged over real MPI
//! point-to-point messaging.

use std::sync::atomic::{AtomicI32, Ordering};

use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use nfio_core::comm::{Comm, Message, Rank, Tag};

/// First tag handed out by the allocator, matching the in-process
/// communicator so tag values agree across transports.
const TAG_ALLOC_BASE: i32 = 100;

/// [`Comm`] implementation over an MPI communicator.
///
/// The tag allocator is process-local state; SPMD symmetry (every rank
/// constructs the same sessions in the same order) keeps it aligned across
/// ranks without communication.
pub struct MpiComm {
    comm: SimpleCommunicator,
    tags: AtomicI32,
}

impl MpiComm {
    pub fn new(comm: SimpleCommunicator) -> Self {
        Self {
            comm,
            tags: AtomicI32::new(TAG_ALLOC_BASE),
        }
    }

    /// The underlying communicator, for collective operations outside the
    /// protocol (reductions, barriers in driver code).
    pub fn world(&self) -> &SimpleCommunicator {
        &self.comm
    }
}

impl Comm for MpiComm {
    fn rank(&self) -> Rank {
        self.comm.rank()
    }

    fn num_procs(&self) -> i32 {
        self.comm.size()
    }

    fn send(&self, value: i32, dest: Rank, tag: Tag) {
        self.comm.process_at_rank(dest).send_with_tag(&value, tag);
    }

    fn recv(&self, source: Rank, tag: Tag) -> i32 {
        let (value, _status) = self
            .comm
            .process_at_rank(source)
            .receive_with_tag::<i32>(tag);
        value
    }

    fn recv_any(&self, tag: Tag) -> Message {
        let (value, status) = self.comm.any_process().receive_with_tag::<i32>(tag);
        Message {
            source: status.source_rank(),
            value,
        }
    }

    fn barrier(&self) {
        self.comm.barrier();
    }

    fn alloc_tags(&self, count: i32) -> Tag {
        self.tags.fetch_add(count, Ordering::Relaxed)
    }
}
