//! Static rank-to-file assignment.
//!
//! These functions are pure and deterministic: every rank (and the
//! coordinator) computes the same answers independently, so no messages are
//! needed to agree on the static schedule. The baton-chain hand-off in the
//! write and read sessions is plain rank arithmetic derived from them.

use std::collections::HashSet;

use crate::comm::Rank;
use crate::error::NfioError;

/// How ranks map onto files when several ranks share one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupingMode {
    /// Ranks cycle across files: file = rank % num_files. Ranks sharing a
    /// file differ by num_files.
    Interleaved,
    /// Contiguous blocks of ranks map to one file: file = rank / wave_count.
    /// Ranks sharing a file are adjacent.
    Grouped,
}

/// Clamp a requested file count to the valid range `[1, num_procs]`.
pub fn actual_file_count(requested: i32, num_procs: i32) -> i32 {
    requested.clamp(1, num_procs)
}

/// Number of writer waves per file: ceil(num_procs / num_files).
pub fn wave_count(num_procs: i32, num_files: i32) -> i32 {
    (num_procs + num_files - 1) / num_files
}

/// File number a rank statically owns a turn on.
pub fn file_number(num_procs: i32, num_files: i32, rank: Rank, mode: GroupingMode) -> i32 {
    match mode {
        GroupingMode::Interleaved => rank % num_files,
        GroupingMode::Grouped => rank / wave_count(num_procs, num_files),
    }
}

/// A rank's position within the wave schedule of its file. Wave 0 is the
/// file owner, which creates the file and never waits.
pub fn wave_position(num_procs: i32, num_files: i32, rank: Rank, mode: GroupingMode) -> i32 {
    match mode {
        GroupingMode::Interleaved => rank / num_files,
        GroupingMode::Grouped => rank % wave_count(num_procs, num_files),
    }
}

/// Verify the assignment actually produces `num_files` distinct file
/// numbers.
///
/// Grouped assignment can collapse files when `num_procs` is not a multiple
/// of the wave count (e.g. 4 procs over 3 files yields 2). The mismatch is
/// returned rather than logged so the caller decides fatal vs. warn.
pub fn check_file_count(
    num_procs: i32,
    num_files: i32,
    mode: GroupingMode,
) -> Result<(), NfioError> {
    let distinct: HashSet<i32> = (0..num_procs)
        .map(|rank| file_number(num_procs, num_files, rank, mode))
        .collect();
    if distinct.len() as i32 != num_files {
        return Err(NfioError::ScheduleMismatch {
            requested: num_files,
            actual: distinct.len() as i32,
        });
    }
    Ok(())
}

/// Immutable per-rank view of the static schedule, computed once at session
/// construction.
#[derive(Debug, Clone)]
pub struct Topology {
    pub num_procs: i32,
    pub my_rank: Rank,
    /// Requested file count clamped to `[1, num_procs]`.
    pub num_files: i32,
    pub mode: GroupingMode,
    pub num_waves: i32,
    pub my_file: i32,
    pub my_wave: i32,
    /// Number of ranks with wave position 0 (one per distinct file).
    pub owner_count: i32,
    /// Highest rank with nonzero wave position, if any. Used as the decider
    /// substitute when the caller's choice is a file owner.
    pub last_non_owner: Option<Rank>,
}

impl Topology {
    pub fn new(num_procs: i32, my_rank: Rank, requested_files: i32, mode: GroupingMode) -> Self {
        let num_files = actual_file_count(requested_files, num_procs);
        let mut owner_count = 0;
        let mut last_non_owner = None;
        for rank in 0..num_procs {
            if wave_position(num_procs, num_files, rank, mode) == 0 {
                owner_count += 1;
            } else {
                last_non_owner = Some(rank);
            }
        }
        Self {
            num_procs,
            my_rank,
            num_files,
            mode,
            num_waves: wave_count(num_procs, num_files),
            my_file: file_number(num_procs, num_files, my_rank, mode),
            my_wave: wave_position(num_procs, num_files, my_rank, mode),
            owner_count,
            last_non_owner,
        }
    }

    /// Wave 0 creates/truncates the file and never waits for a baton.
    pub fn is_file_owner(&self) -> bool {
        self.my_wave == 0
    }

    pub fn file_number_of(&self, rank: Rank) -> i32 {
        file_number(self.num_procs, self.num_files, rank, self.mode)
    }

    pub fn wave_position_of(&self, rank: Rank) -> i32 {
        wave_position(self.num_procs, self.num_files, rank, self.mode)
    }

    /// Rank stride between adjacent waves on the same file.
    fn wave_stride(&self) -> i32 {
        match self.mode {
            GroupingMode::Interleaved => self.num_files,
            GroupingMode::Grouped => 1,
        }
    }

    /// The rank this one waits on for the baton. Only meaningful when not a
    /// file owner.
    pub fn predecessor(&self) -> Rank {
        self.my_rank - self.wave_stride()
    }

    /// The rank to hand the baton to, if one exists on the same file in the
    /// next wave. The last wave's writer terminates the chain.
    pub fn successor(&self) -> Option<Rank> {
        let next = self.my_rank + self.wave_stride();
        if next < self.num_procs && self.file_number_of(next) == self.my_file {
            Some(next)
        } else {
            None
        }
    }
}
