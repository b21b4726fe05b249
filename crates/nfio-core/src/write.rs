//! Write sessions: coordinated shared-file write access for one pass.
//!
//! Static mode is a baton chain: within each file, the wave-0 owner writes
//! first, then each wave hands the open file to the next wave by message.
//! Dynamic mode keeps the owners but replaces the rest of the wave order
//! with a runtime coordinator that hands idle files to whichever rank is
//! ready first.
//!
//! A session covers exactly one write per rank; construct a fresh session
//! for a subsequent pass. Every participating rank must call
//! [`WriteSession::ready_to_write`] and [`WriteSession::done`] exactly once
//! or the remaining ranks deadlock waiting on messages that are never sent.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};

use crate::comm::{Comm, Rank, Tag};
use crate::error::NfioError;
use crate::naming::file_name;
use crate::schedule::{CompletionReport, ScheduleTable, UNASSIGNED};
use crate::topology::{self, GroupingMode, Topology};

/// Stream buffer size applied before first use when the caller does not
/// override it (2 MiB).
pub const DEFAULT_BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Rank that reports schedule-mismatch warnings.
const REPORTING_RANK: Rank = 0;

/// Tags for one dynamic write pass, allocated in [`WriteSession::set_dynamic`].
#[derive(Debug, Clone, Copy)]
struct DynamicTags {
    /// Owners notify the decider of completion here; first notice wins the
    /// coordinator election.
    decider: Tag,
    /// Decider announces the elected coordinator to each owner here.
    coordinator: Tag,
    /// Writers report their file number back to the coordinator here.
    done: Tag,
    /// Coordinator pushes file assignments to idle writers here.
    write: Tag,
}

/// Per-rank state machine for one coordinated write pass.
pub struct WriteSession<'a> {
    comm: &'a dyn Comm,
    topo: Topology,
    prefix: String,
    /// File this rank will write to. Static: fixed by the assignment
    /// functions. Dynamic: reassigned at dispatch for non-owners.
    file_number: i32,
    path: String,
    buffer_size: usize,
    stream: Option<BufWriter<File>>,
    finished: bool,
    static_schedule: bool,
    /// Base of the per-file baton tags (base + file number).
    chain_tag_base: Tag,
    decider: Rank,
    coordinator: Rank,
    dynamic: Option<DynamicTags>,
    report: Option<CompletionReport>,
}

impl<'a> WriteSession<'a> {
    /// Create a static-schedule session for one write pass.
    ///
    /// Computes the rank's topology, reserves the per-file baton tags, and
    /// (on the reporting rank) warns if the assignment collapses file
    /// numbers (see [`topology::check_file_count`]). No file is opened and
    /// no message is exchanged until [`ready_to_write`](Self::ready_to_write).
    pub fn new(
        comm: &'a dyn Comm,
        requested_files: i32,
        prefix: impl Into<String>,
        mode: GroupingMode,
        buffer_size: Option<usize>,
    ) -> Self {
        let prefix = prefix.into();
        let topo = Topology::new(comm.num_procs(), comm.rank(), requested_files, mode);

        if topo.my_rank == REPORTING_RANK {
            if let Err(err) = topology::check_file_count(topo.num_procs, topo.num_files, mode) {
                tracing::warn!(%err, "static file assignment mismatch");
            }
        }

        let chain_tag_base = comm.alloc_tags(topo.num_files);
        let file_number = topo.my_file;
        let path = file_name(&prefix, file_number);
        let report = (topo.my_rank == REPORTING_RANK).then(|| CompletionReport::from_static(&topo));

        Self {
            comm,
            topo,
            prefix,
            file_number,
            path,
            buffer_size: buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            stream: None,
            finished: false,
            static_schedule: true,
            chain_tag_base,
            decider: -1,
            coordinator: REPORTING_RANK,
            dynamic: None,
            report,
        }
    }

    /// Switch the session to dynamic (load-balanced) selection.
    ///
    /// `decider` defaults to the last rank; a choice that is a file owner is
    /// substituted with the last non-owner rank. One file per rank leaves no
    /// valid decider and nothing to balance, so it is rejected rather than
    /// silently degraded — run the session in static mode instead (every
    /// rank is a wave-0 owner and writes immediately anyway).
    pub fn set_dynamic(&mut self, decider: Option<Rank>) -> Result<(), NfioError> {
        if self.topo.num_files == self.topo.num_procs {
            return Err(NfioError::DynamicNotApplicable {
                num_procs: self.topo.num_procs,
                num_files: self.topo.num_files,
            });
        }

        let mut decider = decider.unwrap_or(self.topo.num_procs - 1);
        if decider < 0 || decider >= self.topo.num_procs {
            return Err(NfioError::InvalidConfig(format!(
                "decider rank {decider} out of range for {} procs",
                self.topo.num_procs
            )));
        }
        if self.topo.wave_position_of(decider) == 0 {
            // num_files < num_procs guarantees at least one non-owner.
            decider = match self.topo.last_non_owner {
                Some(rank) => rank,
                None => {
                    return Err(NfioError::DynamicNotApplicable {
                        num_procs: self.topo.num_procs,
                        num_files: self.topo.num_files,
                    });
                }
            };
        }
        self.decider = decider;

        self.dynamic = Some(DynamicTags {
            decider: self.comm.next_tag(),
            coordinator: self.comm.next_tag(),
            done: self.comm.next_tag(),
            write: self.comm.next_tag(),
        });
        self.static_schedule = false;
        // The final write order is only known once the pass completes.
        self.report = None;
        Ok(())
    }

    /// Block until this rank may write, then open the file.
    ///
    /// Returns `Ok(false)` once the session is finished. Wave-0 owners open
    /// immediately (truncating); static non-owners wait for the baton from
    /// their predecessor and open in append mode; dynamic non-owners wait
    /// for a file assignment from the coordinator.
    pub fn ready_to_write(&mut self) -> Result<bool, NfioError> {
        if self.finished {
            return Ok(false);
        }

        if self.static_schedule {
            if self.topo.is_file_owner() {
                self.open_truncate()?;
            } else {
                let tag = self.chain_tag_base + self.topo.my_file;
                let _ = self.comm.recv(self.topo.predecessor(), tag);
                self.open_append()?;
            }
            return Ok(true);
        }

        let tags = self.dynamic_tags()?;

        if self.topo.is_file_owner() {
            self.open_truncate()?;
            return Ok(true);
        }

        if self.comm.rank() == self.decider {
            self.relay_election(tags);
        }

        // Plain writers (the decider drops through to here) wait for the
        // coordinator to assign a file.
        let msg = self.comm.recv_any(tags.write);
        self.coordinator = msg.source;
        self.file_number = msg.value;
        self.path = file_name(&self.prefix, self.file_number);
        self.open_append()?;
        Ok(true)
    }

    /// Finish this rank's write: flush and close the file, then unblock
    /// whoever comes next (static successor, or the coordinator's dispatch
    /// loop in dynamic mode). The elected coordinator runs the dispatch
    /// loop to completion inside this call.
    pub fn done(&mut self) -> Result<(), NfioError> {
        if self.finished {
            return Ok(());
        }

        if self.static_schedule {
            self.close_stream()?;
            self.finished = true;
            if let Some(successor) = self.topo.successor() {
                self.comm
                    .send(0, successor, self.chain_tag_base + self.topo.my_file);
            }
            return Ok(());
        }

        let tags = self.dynamic_tags()?;
        self.close_stream()?;
        self.finished = true;

        if self.topo.is_file_owner() {
            // Report completion to the decider; the first such notice
            // nominates its sender as coordinator.
            let me = self.comm.rank();
            self.comm.send(me, self.decider, tags.decider);
            self.coordinator = self.comm.recv(self.decider, tags.coordinator);

            if me == self.coordinator {
                self.run_dispatch(tags)?;
            } else {
                self.comm.send(self.file_number, self.coordinator, tags.done);
            }
            return Ok(());
        }

        // Plain writer: hand the file back to the coordinator.
        self.comm.send(self.file_number, self.coordinator, tags.done);
        Ok(())
    }

    /// Decider role: the first completion notice elects the coordinator;
    /// relay its identity to each remaining owner as their notices arrive.
    fn relay_election(&self, tags: DynamicTags) {
        let first = self.comm.recv_any(tags.decider);
        let coordinator = first.value;
        tracing::debug!(coordinator, "elected write coordinator");
        self.comm.send(coordinator, coordinator, tags.coordinator);
        for _ in 0..self.topo.owner_count - 1 {
            let notice = self.comm.recv_any(tags.decider);
            self.comm.send(coordinator, notice.value, tags.coordinator);
        }
    }

    /// Coordinator role: hand idle files to ready writers until every rank
    /// has written once.
    fn run_dispatch(&mut self, tags: DynamicTags) -> Result<(), NfioError> {
        let mut table = ScheduleTable::seed(&self.topo, self.file_number);
        tracing::debug!(rank = self.comm.rank(), "coordinating dynamic write pass");

        while !table.is_done() {
            let (rank, file) = table.next_dispatch().ok_or_else(|| {
                NfioError::InvalidConfig(
                    "dispatch queues drained before all writers were scheduled".into(),
                )
            })?;
            self.comm.send(file, rank, tags.write);

            let done = self.comm.recv_any(tags.done);
            table.mark_available(done.value);
            table.writer_finished();
        }

        // Drain the other owners' completion notices so no message is left
        // unmatched at shutdown.
        for _ in 0..self.topo.owner_count - 1 {
            let _ = self.comm.recv_any(tags.done);
        }

        let report = table.into_report(self.topo.num_procs);
        debug_assert!(report.verify_partition().is_ok());
        self.report = Some(report);
        Ok(())
    }

    fn dynamic_tags(&self) -> Result<DynamicTags, NfioError> {
        self.dynamic.ok_or_else(|| {
            NfioError::InvalidConfig("dynamic session used without set_dynamic".into())
        })
    }

    fn open_truncate(&mut self) -> Result<(), NfioError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| NfioError::FileOpen {
                path: self.path.clone(),
                source,
            })?;
        self.stream = Some(BufWriter::with_capacity(self.buffer_size, file));
        Ok(())
    }

    fn open_append(&mut self) -> Result<(), NfioError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| NfioError::FileOpen {
                path: self.path.clone(),
                source,
            })?;
        // Position at end so stream_position() reports real offsets even
        // before the first write.
        file.seek(SeekFrom::End(0)).map_err(|source| NfioError::FileIo {
            path: self.path.clone(),
            source,
        })?;
        self.stream = Some(BufWriter::with_capacity(self.buffer_size, file));
        Ok(())
    }

    fn close_stream(&mut self) -> Result<(), NfioError> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush().map_err(|source| NfioError::FileIo {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// The open stream, once `ready_to_write` returned true. The payload
    /// writer performs arbitrary byte-level I/O here; the session does not
    /// interpret payload bytes.
    pub fn writer(&mut self) -> Option<&mut BufWriter<File>> {
        self.stream.as_mut()
    }

    /// Current write offset, for recording per-contribution byte ranges in
    /// external metadata.
    pub fn stream_position(&mut self) -> Result<u64, NfioError> {
        match self.stream.as_mut() {
            Some(stream) => stream.stream_position().map_err(|source| NfioError::FileIo {
                path: self.path.clone(),
                source,
            }),
            None => Err(NfioError::InvalidConfig(
                "stream_position on a session with no open stream".into(),
            )),
        }
    }

    /// File number this rank writes (or wrote) to.
    pub fn file_number(&self) -> i32 {
        self.file_number
    }

    /// Path of this rank's file.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    /// Final per-rank file assignment, [`UNASSIGNED`] everywhere except on
    /// the rank holding the report (static: the reporting rank; dynamic:
    /// the elected coordinator, after the pass completes).
    pub fn file_numbers_written(&self) -> Vec<i32> {
        match &self.report {
            Some(report) => report.file_numbers_written(),
            None => vec![UNASSIGNED; self.topo.num_procs as usize],
        }
    }

    /// The completion report, where this rank holds one.
    pub fn completion_report(&self) -> Option<&CompletionReport> {
        self.report.as_ref()
    }
}
