use std::io::{Read, Seek, SeekFrom, Write};

use mpi::traits::*;

use nfio_core::schedule::CompletionReport;
use nfio_core::timer::{
    PassTimers, TIMER_CLOSE_START, TIMER_CLOSE_STOP, TIMER_IO_START, TIMER_IO_STOP,
    TIMER_READY_START, TIMER_READY_STOP, now,
};
use nfio_core::{Comm, GroupingMode, NfioError, ReadSession, Topology, WriteSession, file_name};
use nfio_mpi::MpiComm;

use crate::cli::{self, CliArgs};
use crate::report::{self, PassResult};

/// Transfer chunk size for payload writes.
const CHUNK: usize = 256 * 1024;

/// Smallest accepted per-rank payload: the record starts with a 4-byte
/// rank header, so anything shorter can be neither stamped nor verified.
const MIN_BYTES_PER_RANK: i64 = 4;

/// Benchmark options resolved from the CLI.
pub struct BenchOpts {
    pub nfiles: i32,
    pub prefix: String,
    pub mode: GroupingMode,
    pub dynamic: bool,
    pub decider: Option<i32>,
    pub bytes_per_rank: i64,
    pub buffer_size: usize,
    pub ntimes: i32,
    pub read_back: bool,
    pub keep_files: bool,
}

/// Resolve CLI arguments into validated benchmark options.
///
/// Size strings are checked here, before any rank opens a file or sends a
/// message, so a bad value fails the run symmetrically on every rank.
pub fn resolve_opts(args: &CliArgs, num_procs: i32) -> Result<BenchOpts, NfioError> {
    let bytes_per_rank = cli::parse_size(&args.bytes_per_rank);
    if bytes_per_rank < MIN_BYTES_PER_RANK {
        return Err(NfioError::InvalidConfig(format!(
            "bytes-per-rank must be at least {MIN_BYTES_PER_RANK} (rank header), \
             got {bytes_per_rank}"
        )));
    }
    let buffer_size = cli::parse_size(&args.buffer_size);
    if buffer_size <= 0 {
        return Err(NfioError::InvalidConfig(format!(
            "buffer-size must be positive, got {buffer_size}"
        )));
    }

    Ok(BenchOpts {
        nfiles: nfio_core::topology::actual_file_count(args.nfiles, num_procs),
        prefix: args.prefix.clone(),
        mode: args.mode(),
        dynamic: args.dynamic,
        decider: args.decider,
        bytes_per_rank,
        buffer_size: buffer_size as usize,
        ntimes: args.ntimes,
        read_back: args.read_back,
        keep_files: args.keep_files,
    })
}

/// Run the full benchmark loop: `ntimes` coordinated write passes, each
/// optionally followed by an ordered read-back verification.
pub fn run(
    comm: &MpiComm,
    opts: &BenchOpts,
    print_text: bool,
) -> Result<Vec<PassResult>, NfioError> {
    let world = comm.world();
    let mut results = Vec::new();

    if print_text {
        report::print_header(world);
    }

    for rep in 0..opts.ntimes {
        remove_files(comm, opts);
        world.barrier();

        let write_result = run_write_pass(comm, opts, rep)?;
        if print_text {
            report::print_result(&write_result, world);
        }
        results.push(write_result);

        if opts.read_back && !opts.dynamic {
            world.barrier();
            let read_result = run_read_back(comm, opts, rep)?;
            if print_text {
                report::print_result(&read_result, world);
            }
            results.push(read_result);
        }

        if !opts.keep_files {
            world.barrier();
            remove_files(comm, opts);
        }
        world.barrier();
    }

    if print_text && opts.ntimes > 1 {
        let (writes, reads): (Vec<PassResult>, Vec<PassResult>) = results
            .iter()
            .cloned()
            .partition(|r| r.access.ends_with("write"));
        if let Some(first) = writes.first() {
            let access = first.access.clone();
            report::print_summary(&access, &writes, world);
        }
        if !reads.is_empty() {
            report::print_summary("read", &reads, world);
        }
    }

    Ok(results)
}

/// One coordinated write pass: every rank writes `bytes_per_rank` bytes,
/// prefixed with its rank so read-back can verify placement.
fn run_write_pass(comm: &MpiComm, opts: &BenchOpts, rep: i32) -> Result<PassResult, NfioError> {
    let world = comm.world();
    let mut timers = PassTimers::default();

    let mut session = WriteSession::new(
        comm,
        opts.nfiles,
        &opts.prefix,
        opts.mode,
        Some(opts.buffer_size),
    );
    let access = if opts.dynamic {
        session.set_dynamic(opts.decider)?;
        "dynamic write"
    } else {
        "static write"
    };

    world.barrier();

    timers.timers[TIMER_READY_START] = now();
    session.ready_to_write()?;
    timers.timers[TIMER_READY_STOP] = now();

    timers.timers[TIMER_IO_START] = now();
    let data_moved = write_payload(&mut session, comm.rank(), opts.bytes_per_rank)?;
    timers.timers[TIMER_IO_STOP] = now();

    timers.timers[TIMER_CLOSE_START] = now();
    session.done()?;
    timers.timers[TIMER_CLOSE_STOP] = now();

    world.barrier();

    // The report lives on rank 0 (static) or the elected coordinator
    // (dynamic); everyone else skips this.
    if let Some(completion) = session.completion_report() {
        match completion.verify_partition() {
            Ok(()) => tracing::debug!(
                assignment = ?completion.file_numbers_written(),
                "final rank-to-file assignment"
            ),
            Err(err) => tracing::warn!(%err, "completion report failed verification"),
        }
    }

    let reduced = report::reduce_timers(&timers, world);
    let agg = report::reduce_data_moved(data_moved, world);
    Ok(report::compute_result(access, &reduced, agg, rep))
}

/// Write the rank header and rank-patterned payload through the session
/// stream.
fn write_payload(session: &mut WriteSession<'_>, rank: i32, bytes: i64) -> Result<i64, NfioError> {
    let path = session.path().to_string();
    let writer = session
        .writer()
        .ok_or_else(|| NfioError::InvalidConfig("payload write before ready".into()))?;

    let mut remaining = bytes as usize;
    let mut first = true;
    while remaining > 0 {
        let len = CHUNK.min(remaining);
        let mut chunk = vec![rank as u8; len];
        if first {
            chunk[..4].copy_from_slice(&rank.to_le_bytes());
            first = false;
        }
        writer.write_all(&chunk).map_err(|source| NfioError::FileIo {
            path: path.clone(),
            source,
        })?;
        remaining -= len;
    }
    Ok(bytes)
}

/// Ordered read-back of a static pass: each file's writers re-read it in
/// wave order and verify their own record landed at their wave offset.
fn run_read_back(comm: &MpiComm, opts: &BenchOpts, rep: i32) -> Result<PassResult, NfioError> {
    let world = comm.world();
    let topo = Topology::new(comm.num_procs(), comm.rank(), opts.nfiles, opts.mode);
    let static_order = CompletionReport::from_static(&topo);

    let mut timers = PassTimers::default();
    let mut data_moved: i64 = 0;

    // Every rank constructs every file's session to keep the tag
    // allocators aligned; ready_to_read is true only for this rank's file.
    for file in 0..topo.num_files {
        let readers = static_order.write_order(file).to_vec();
        let mut session = ReadSession::new(
            comm,
            file_name(&opts.prefix, file),
            readers,
            Some(opts.buffer_size),
        )?;

        if file == topo.my_file {
            timers.timers[TIMER_READY_START] = now();
        }
        if session.ready_to_read()? {
            timers.timers[TIMER_READY_STOP] = now();

            timers.timers[TIMER_IO_START] = now();
            data_moved = verify_record(&mut session, &topo, opts.bytes_per_rank)?;
            timers.timers[TIMER_IO_STOP] = now();

            timers.timers[TIMER_CLOSE_START] = now();
            session.done()?;
            timers.timers[TIMER_CLOSE_STOP] = now();
        } else {
            session.done()?;
        }
    }

    world.barrier();

    let reduced = report::reduce_timers(&timers, world);
    let agg = report::reduce_data_moved(data_moved, world);
    Ok(report::compute_result("read", &reduced, agg, rep))
}

/// Check the record at this rank's wave offset carries this rank's header,
/// then drain the rest of the record.
fn verify_record(
    session: &mut ReadSession<'_>,
    topo: &Topology,
    bytes_per_rank: i64,
) -> Result<i64, NfioError> {
    let path = session.path().to_string();
    let reader = session
        .reader()
        .ok_or_else(|| NfioError::InvalidConfig("record read before ready".into()))?;
    let io_err = |source| NfioError::FileIo {
        path: path.clone(),
        source,
    };

    reader
        .seek(SeekFrom::Start(topo.my_wave as u64 * bytes_per_rank as u64))
        .map_err(io_err)?;

    let mut header = [0u8; 4];
    reader.read_exact(&mut header).map_err(io_err)?;
    let written_rank = i32::from_le_bytes(header);
    if written_rank != topo.my_rank {
        return Err(NfioError::InvalidConfig(format!(
            "read-back mismatch in {path}: wave {} holds rank {written_rank}, expected {}",
            topo.my_wave, topo.my_rank
        )));
    }

    let rest = bytes_per_rank as u64 - 4;
    let drained = std::io::copy(&mut reader.by_ref().take(rest), &mut std::io::sink())
        .map_err(io_err)?;
    if drained != rest {
        return Err(NfioError::InvalidConfig(format!(
            "read-back short record in {path}: {drained} of {rest} payload bytes",
        )));
    }

    Ok(bytes_per_rank)
}

/// Delete the pass's output files. Rank 0 only; missing files are fine.
fn remove_files(comm: &MpiComm, opts: &BenchOpts) {
    if comm.rank() == 0 {
        // opts.nfiles is already clamped by resolve_opts.
        for file in 0..opts.nfiles {
            let _ = std::fs::remove_file(file_name(&opts.prefix, file));
        }
    }
}
