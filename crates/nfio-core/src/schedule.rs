//! Coordinator-side schedule bookkeeping for the dynamic write protocol.
//!
//! The [`ScheduleTable`] exists only on the rank elected coordinator; it is
//! plain rank-local memory and all cross-rank knowledge flows through
//! messages. It tracks, per file, which ranks are still owed a turn (seeded
//! from the static schedule) and the order ranks actually wrote in.

use std::collections::{BTreeSet, HashSet, VecDeque};

use crate::comm::Rank;
use crate::error::NfioError;
use crate::topology::Topology;

/// Sentinel file number for ranks whose assignment is unknown on this rank.
pub const UNASSIGNED: i32 = -1;

/// Per-file dispatch queues and arrival-order record, owned by the elected
/// coordinator for the duration of one dynamic write pass.
#[derive(Debug)]
pub struct ScheduleTable {
    /// Arrival order of ranks into each file.
    written: Vec<Vec<Rank>>,
    /// Ranks statically owed a turn on each file, consumed during dispatch.
    pending: Vec<VecDeque<Rank>>,
    /// File numbers currently idle and ready for a writer.
    available: BTreeSet<i32>,
    /// Ranks not yet scheduled. File owners are counted at setup.
    remaining_writers: i32,
}

impl ScheduleTable {
    /// Build the table from the static schedule.
    ///
    /// File owners (wave position 0) have already written by the time the
    /// coordinator is elected: they are recorded as written and excluded
    /// from the pending queues. The coordinator's own file seeds the
    /// available set; the other owners' files become available as their
    /// completion notices arrive.
    pub fn seed(topo: &Topology, coordinator_file: i32) -> Self {
        let nf = topo.num_files as usize;
        let mut written = vec![Vec::new(); nf];
        let mut pending = vec![VecDeque::new(); nf];
        let mut remaining_writers = topo.num_procs;

        for rank in 0..topo.num_procs {
            let file = topo.file_number_of(rank) as usize;
            if topo.wave_position_of(rank) == 0 {
                written[file].push(rank);
                remaining_writers -= 1;
            } else {
                pending[file].push_back(rank);
            }
        }

        let mut available = BTreeSet::new();
        available.insert(coordinator_file);

        Self {
            written,
            pending,
            available,
            remaining_writers,
        }
    }

    /// Pick the next (rank, file) pair to dispatch.
    ///
    /// The target is always the smallest currently-available file number.
    /// The rank comes from that file's static queue, or, if it is empty,
    /// from the next file number (wrapping) with a non-empty queue — idle
    /// files never sit out while any rank is still unscheduled.
    pub fn next_dispatch(&mut self) -> Option<(Rank, i32)> {
        let file = *self.available.iter().next()?;
        self.available.remove(&file);

        let nf = self.pending.len();
        for probe in 0..nf {
            let queue = &mut self.pending[(file as usize + probe) % nf];
            if let Some(rank) = queue.pop_front() {
                self.written[file as usize].push(rank);
                return Some((rank, file));
            }
        }
        None
    }

    /// A writer reported completion on `file`; it may take a new writer.
    pub fn mark_available(&mut self, file: i32) {
        self.available.insert(file);
    }

    pub fn writer_finished(&mut self) {
        self.remaining_writers -= 1;
    }

    pub fn is_done(&self) -> bool {
        self.remaining_writers <= 0
    }

    pub fn into_report(self, num_procs: i32) -> CompletionReport {
        CompletionReport {
            num_procs,
            written: self.written,
        }
    }
}

/// Final rank-to-file assignment after a write pass, held by the
/// coordinator for downstream metadata bookkeeping.
#[derive(Debug, Clone)]
pub struct CompletionReport {
    num_procs: i32,
    written: Vec<Vec<Rank>>,
}

impl CompletionReport {
    /// The static schedule as a report, for static-mode sessions where the
    /// write order is known up front.
    pub fn from_static(topo: &Topology) -> Self {
        let mut written = vec![Vec::new(); topo.num_files as usize];
        for rank in 0..topo.num_procs {
            written[topo.file_number_of(rank) as usize].push(rank);
        }
        // Within a file the static order is wave order.
        for ranks in &mut written {
            ranks.sort_by_key(|&r| topo.wave_position_of(r));
        }
        Self {
            num_procs: topo.num_procs,
            written,
        }
    }

    /// Arrival order of ranks into one file.
    pub fn write_order(&self, file: i32) -> &[Rank] {
        &self.written[file as usize]
    }

    /// Flatten to a per-rank file number, [`UNASSIGNED`] for ranks the
    /// report does not cover.
    pub fn file_numbers_written(&self) -> Vec<i32> {
        let mut out = vec![UNASSIGNED; self.num_procs as usize];
        for (file, ranks) in self.written.iter().enumerate() {
            for &rank in ranks {
                out[rank as usize] = file as i32;
            }
        }
        out
    }

    /// Check the flattened assignment is a true partition of all ranks:
    /// every rank appears exactly once across all files.
    pub fn verify_partition(&self) -> Result<(), NfioError> {
        let total: usize = self.written.iter().map(Vec::len).sum();
        let distinct: HashSet<Rank> = self.written.iter().flatten().copied().collect();
        if total != self.num_procs as usize || distinct.len() != self.num_procs as usize {
            return Err(NfioError::PartitionViolation {
                total,
                distinct: distinct.len(),
                num_procs: self.num_procs,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::GroupingMode;

    fn topo(np: i32, nf: i32, mode: GroupingMode) -> Topology {
        Topology::new(np, 0, nf, mode)
    }

    #[test]
    fn test_seed_counts_owners_as_written() {
        // 5 procs, 2 files, grouped: owners are ranks 0 (file 0) and 3 (file 1).
        let t = topo(5, 2, GroupingMode::Grouped);
        let table = ScheduleTable::seed(&t, 0);
        assert_eq!(table.remaining_writers, 3);
        assert_eq!(table.written[0], vec![0]);
        assert_eq!(table.written[1], vec![3]);
        assert_eq!(table.pending[0], VecDeque::from(vec![1, 2]));
        assert_eq!(table.pending[1], VecDeque::from(vec![4]));
    }

    #[test]
    fn test_dispatch_prefers_smallest_available_file() {
        let t = topo(6, 2, GroupingMode::Interleaved);
        // Owners: 0 (file 0), 1 (file 1). Pending: file 0 <- [2, 4], file 1 <- [3, 5].
        let mut table = ScheduleTable::seed(&t, 0);
        table.mark_available(1);

        let (rank, file) = table.next_dispatch().unwrap();
        assert_eq!((rank, file), (2, 0));
        let (rank, file) = table.next_dispatch().unwrap();
        assert_eq!((rank, file), (3, 1));
    }

    #[test]
    fn test_dispatch_wraps_to_nonempty_queue() {
        let t = topo(5, 2, GroupingMode::Grouped);
        // Pending: file 0 <- [1, 2], file 1 <- [4].
        let mut table = ScheduleTable::seed(&t, 1);

        // File 1 is available but its queue drains first; the scan wraps to
        // file 0's queue while still assigning file 1.
        let (rank, file) = table.next_dispatch().unwrap();
        assert_eq!((rank, file), (4, 1));
        table.mark_available(1);
        let (rank, file) = table.next_dispatch().unwrap();
        assert_eq!((rank, file), (1, 1));
        table.mark_available(0);
        let (rank, file) = table.next_dispatch().unwrap();
        assert_eq!((rank, file), (2, 0));
        assert!(table.next_dispatch().is_none());
    }

    #[test]
    fn test_full_drain_is_partition() {
        for mode in [GroupingMode::Interleaved, GroupingMode::Grouped] {
            let t = topo(9, 3, mode);
            let coord_file = t.file_number_of(0);
            let mut table = ScheduleTable::seed(&t, coord_file);
            while !table.is_done() {
                let (_, file) = table.next_dispatch().expect("queue drained early");
                table.writer_finished();
                table.mark_available(file);
            }
            let report = table.into_report(9);
            report.verify_partition().unwrap();
            let flat = report.file_numbers_written();
            assert_eq!(flat.len(), 9);
            assert!(flat.iter().all(|&f| f >= 0 && f < 3));
        }
    }

    #[test]
    fn test_static_report_wave_order() {
        let t = topo(4, 2, GroupingMode::Interleaved);
        let report = CompletionReport::from_static(&t);
        assert_eq!(report.write_order(0), &[0, 2]);
        assert_eq!(report.write_order(1), &[1, 3]);
        assert_eq!(report.file_numbers_written(), vec![0, 1, 0, 1]);
        report.verify_partition().unwrap();
    }

    #[test]
    fn test_partition_violation_detected() {
        let report = CompletionReport {
            num_procs: 3,
            written: vec![vec![0, 1], vec![1]],
        };
        match report.verify_partition() {
            Err(NfioError::PartitionViolation {
                total, distinct, ..
            }) => {
                assert_eq!(total, 3);
                assert_eq!(distinct, 2);
            }
            other => panic!("expected PartitionViolation, got {other:?}"),
        }
    }
}
