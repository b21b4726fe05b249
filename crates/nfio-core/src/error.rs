use std::io;

use thiserror::Error;

use crate::comm::Rank;

/// Error type for the N-file coordination protocol.
///
/// All I/O and configuration failures here are fatal for the whole
/// distributed run: other ranks may already be blocked on messages tied to
/// this rank's progress, so there is no per-rank recovery path.
#[derive(Debug, Error)]
pub enum NfioError {
    /// A physical file could not be opened for write, append, or read.
    #[error("failed to open {path}")]
    FileOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Flush, seek, or close failed on an open session stream.
    #[error("I/O error on {path}")]
    FileIo {
        path: String,
        #[source]
        source: io::Error,
    },

    /// A rank appears more than once in an ordered reader list.
    #[error("duplicate rank {rank} in ordered reader list")]
    DuplicateReadRank { rank: Rank },

    /// The assignment function produced fewer distinct file numbers than
    /// requested. Advisory for the core; callers decide fatal vs. warn.
    #[error("schedule mismatch: requested {requested} files, assignment produced {actual}")]
    ScheduleMismatch { requested: i32, actual: i32 },

    /// The final write assignment does not cover every rank exactly once.
    #[error(
        "write assignment is not a partition: {total} entries, {distinct} distinct ranks, \
         {num_procs} procs"
    )]
    PartitionViolation {
        total: usize,
        distinct: usize,
        num_procs: i32,
    },

    /// Dynamic selection requested with one file per rank. Every rank is a
    /// file owner, so there is no valid decider and nothing to balance.
    #[error("dynamic selection not applicable: {num_files} files for {num_procs} procs")]
    DynamicNotApplicable { num_procs: i32, num_files: i32 },

    /// Precondition violation in session configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
