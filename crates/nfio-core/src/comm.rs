//! Point-to-point messaging abstraction the protocol runs on.
//!
//! Every cross-rank interaction in this crate is a blocking exchange of a
//! single `i32` payload addressed by `(rank, tag)`. The trait is the seam
//! between the protocol state machines and the transport: production runs
//! use an MPI-backed implementation, the test suite uses [`local::LocalWorld`]
//! which drives the same state machines on in-process threads.

pub mod local;

/// Identifies one participating process within the cooperating group.
pub type Rank = i32;

/// Message tag scoping a blocking receive to one protocol exchange.
pub type Tag = i32;

/// A received point-to-point message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    /// Rank that sent the message.
    pub source: Rank,
    /// Payload value.
    pub value: i32,
}

/// Blocking point-to-point communication between SPMD ranks.
///
/// Sends are fire-and-forget, receives block until a matching message
/// arrives. There are no timeouts: a rank that never sends deadlocks every
/// rank downstream of it, by design of the protocol.
pub trait Comm {
    /// This process's rank.
    fn rank(&self) -> Rank;

    /// Total number of participating ranks.
    fn num_procs(&self) -> i32;

    /// Send `value` to `dest`, scoped by `tag`.
    fn send(&self, value: i32, dest: Rank, tag: Tag);

    /// Block until a message from `source` with `tag` arrives.
    fn recv(&self, source: Rank, tag: Tag) -> i32;

    /// Block until a message with `tag` arrives from any rank.
    ///
    /// Used where the receiver cannot know in advance which rank reports
    /// next (coordinator election and dynamic dispatch).
    fn recv_any(&self, tag: Tag) -> Message;

    /// Block until every rank has entered the barrier.
    fn barrier(&self);

    /// Reserve `count` consecutive tags from the process-wide monotonic
    /// allocator and return the first.
    ///
    /// SPMD symmetry keeps the allocators identical across ranks: every
    /// rank constructs the same sessions in the same order, so every rank
    /// computes the same tag values without communicating.
    fn alloc_tags(&self, count: i32) -> Tag;

    /// Reserve a single tag.
    fn next_tag(&self) -> Tag {
        self.alloc_tags(1)
    }
}
