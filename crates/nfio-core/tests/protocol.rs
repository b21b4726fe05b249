//! End-to-end protocol tests: every rank runs on its own thread over the
//! in-process communicator, writing and reading real files.

use std::io::{Read, Write};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use nfio_core::comm::Comm;
use nfio_core::comm::local::{LocalComm, LocalWorld};
use nfio_core::schedule::UNASSIGNED;
use nfio_core::{GroupingMode, ReadSession, WriteSession, file_name};

const RECORD_LEN: usize = 16;

/// Self-identifying payload record: 4-byte LE rank plus a rank-value fill.
fn record(rank: i32) -> Vec<u8> {
    let mut buf = rank.to_le_bytes().to_vec();
    buf.resize(RECORD_LEN, rank as u8);
    buf
}

fn rank_of_record(buf: &[u8]) -> i32 {
    i32::from_le_bytes(buf[..4].try_into().unwrap())
}

/// Run one closure per rank on its own thread and collect the results in
/// rank order.
fn run_ranks<T, F>(num_procs: i32, body: F) -> Vec<T>
where
    T: Send,
    F: Fn(LocalComm) -> T + Sync,
{
    let endpoints = LocalWorld::endpoints(num_procs);
    let body = &body;
    thread::scope(|s| {
        let handles: Vec<_> = endpoints
            .into_iter()
            .map(|ep| s.spawn(move || body(ep)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn write_pass(
    comm: &dyn Comm,
    num_files: i32,
    prefix: &str,
    mode: GroupingMode,
    dynamic: bool,
    jitter_ms: u64,
) -> Vec<i32> {
    let mut session = WriteSession::new(comm, num_files, prefix, mode, Some(4096));
    if dynamic {
        session.set_dynamic(None).unwrap();
    }
    thread::sleep(Duration::from_millis(jitter_ms));
    assert!(session.ready_to_write().unwrap());
    session
        .writer()
        .unwrap()
        .write_all(&record(comm.rank()))
        .unwrap();
    session.done().unwrap();
    let assignment = session.file_numbers_written();
    comm.barrier();
    assignment
}

#[test]
fn test_static_round_trip_wave_order() {
    // 4 ranks over 2 files, both grouping modes: each file must contain its
    // waves' records in ascending wave order.
    for (mode, writers_per_file) in [
        (GroupingMode::Grouped, [vec![0, 1], vec![2, 3]]),
        (GroupingMode::Interleaved, [vec![0, 2], vec![1, 3]]),
    ] {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("static_").to_string_lossy().into_owned();

        run_ranks(4, |ep| {
            write_pass(&ep, 2, &prefix, mode, false, 0);
        });

        for (file, writers) in writers_per_file.iter().enumerate() {
            let bytes = std::fs::read(file_name(&prefix, file as i32)).unwrap();
            assert_eq!(bytes.len(), RECORD_LEN * writers.len(), "{mode:?} file {file}");
            for (wave, &writer) in writers.iter().enumerate() {
                let rec = &bytes[wave * RECORD_LEN..(wave + 1) * RECORD_LEN];
                assert_eq!(rank_of_record(rec), writer, "{mode:?} file {file} wave {wave}");
            }
        }
    }
}

#[test]
fn test_one_file_per_rank_writes_independently() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("own_").to_string_lossy().into_owned();

    run_ranks(3, |ep| {
        let mut session = WriteSession::new(&ep, 3, &prefix, GroupingMode::Interleaved, None);
        assert!(session.topology().is_file_owner());
        assert!(session.ready_to_write().unwrap());
        session
            .writer()
            .unwrap()
            .write_all(&record(ep.rank()))
            .unwrap();
        session.done().unwrap();
    });

    for rank in 0..3 {
        let bytes = std::fs::read(file_name(&prefix, rank)).unwrap();
        assert_eq!(rank_of_record(&bytes), rank);
    }
}

#[test]
fn test_dynamic_partition_under_jitter() {
    // 5 ranks over 2 files: whatever order ranks become ready in, the final
    // assignment must cover every rank exactly once.
    for jitter in [[0, 0, 0, 0, 0], [40, 0, 25, 0, 10], [0, 30, 5, 20, 35]] {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("dyn_").to_string_lossy().into_owned();

        let assignments = run_ranks(5, |ep| {
            let jitter_ms = jitter[ep.rank() as usize];
            write_pass(&ep, 2, &prefix, GroupingMode::Grouped, true, jitter_ms)
        });

        // Exactly one rank (the elected coordinator) holds the report.
        let reports: Vec<&Vec<i32>> = assignments
            .iter()
            .filter(|a| a.iter().any(|&f| f != UNASSIGNED))
            .collect();
        assert_eq!(reports.len(), 1);

        let report = reports[0];
        assert_eq!(report.len(), 5);
        assert!(report.iter().all(|&f| (0..2).contains(&f)));

        // Per-file counts in the report match the bytes on disk, and every
        // rank's record landed in the file the report says it did.
        for file in 0..2 {
            let expected: Vec<i32> = (0..5).filter(|&r| report[r as usize] == file).collect();
            let bytes = std::fs::read(file_name(&prefix, file)).unwrap();
            assert_eq!(bytes.len(), RECORD_LEN * expected.len());
            let mut seen: Vec<i32> = bytes
                .chunks(RECORD_LEN)
                .map(rank_of_record)
                .collect();
            seen.sort();
            assert_eq!(seen, expected);
        }
    }
}

#[test]
fn test_dynamic_owners_never_wait() {
    // Owners write immediately even when every non-owner is delayed.
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("owner_").to_string_lossy().into_owned();

    run_ranks(6, |ep| {
        let topo_owner = {
            let session = WriteSession::new(&ep, 2, &prefix, GroupingMode::Interleaved, None);
            session.topology().is_file_owner()
        };
        let jitter = if topo_owner { 0 } else { 30 };
        write_pass(&ep, 2, &prefix, GroupingMode::Interleaved, true, jitter);
    });

    for file in 0..2 {
        let bytes = std::fs::read(file_name(&prefix, file)).unwrap();
        // First record in each file is its owner's (it truncates on open).
        assert_eq!(rank_of_record(&bytes[..RECORD_LEN]), file);
    }
}

#[test]
fn test_read_session_ordered_exclusive() {
    // Explicit reader list [2, 5, 7] over one shared file, 8 ranks total.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared").to_string_lossy().into_owned();
    std::fs::write(&path, b"0123456789abcdef").unwrap();

    let order = Mutex::new(Vec::new());
    let reading = AtomicBool::new(false);

    run_ranks(8, |ep| {
        let mut session = ReadSession::new(&ep, &path, vec![2, 5, 7], None).unwrap();
        let participating = session.ready_to_read().unwrap();
        assert_eq!(participating, [2, 5, 7].contains(&ep.rank()));

        if participating {
            // No two readers may hold the file at once.
            assert!(!reading.swap(true, Ordering::SeqCst));
            let mut buf = Vec::new();
            session.reader().unwrap().read_to_end(&mut buf).unwrap();
            assert_eq!(buf.len(), 16);
            order.lock().unwrap().push(ep.rank());
            thread::sleep(Duration::from_millis(5));
            assert!(reading.swap(false, Ordering::SeqCst));
        }
        session.done().unwrap();
        assert!(session.is_finished());
    });

    assert_eq!(*order.lock().unwrap(), vec![2, 5, 7]);
}

#[test]
fn test_write_then_ordered_read_back() {
    // Static write of 6 ranks over 2 files, then each file is read back by
    // its writers in wave order; reader i checks record i is its own.
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("pass_").to_string_lossy().into_owned();

    run_ranks(6, |ep| {
        write_pass(&ep, 2, &prefix, GroupingMode::Grouped, false, 0);

        // Grouped, 6 ranks, 2 files: file 0 <- [0, 1, 2], file 1 <- [3, 4, 5].
        let my_file = if ep.rank() < 3 { 0 } else { 1 };
        for file in 0..2 {
            let readers: Vec<i32> = (file * 3..file * 3 + 3).collect();
            let mut session =
                ReadSession::new(&ep, file_name(&prefix, file), readers.clone(), None).unwrap();
            if session.ready_to_read().unwrap() {
                assert_eq!(file, my_file);
                let index = readers.iter().position(|&r| r == ep.rank()).unwrap();
                let mut bytes = vec![0u8; RECORD_LEN * (index + 1)];
                session.reader().unwrap().read_exact(&mut bytes).unwrap();
                let own = &bytes[index * RECORD_LEN..];
                assert_eq!(rank_of_record(own), ep.rank());
            }
            session.done().unwrap();
        }
    });
}

#[test]
fn test_back_to_back_sessions_use_disjoint_tags() {
    // Two write passes and a read pass in sequence; the tag allocator keeps
    // their messages from cross-talking.
    let dir = tempfile::tempdir().unwrap();
    let prefix_a = dir.path().join("a_").to_string_lossy().into_owned();
    let prefix_b = dir.path().join("b_").to_string_lossy().into_owned();

    run_ranks(4, |ep| {
        write_pass(&ep, 2, &prefix_a, GroupingMode::Grouped, false, 0);
        write_pass(&ep, 2, &prefix_b, GroupingMode::Interleaved, true, 0);
    });

    for prefix in [&prefix_a, &prefix_b] {
        for file in 0..2 {
            let bytes = std::fs::read(file_name(prefix, file)).unwrap();
            assert_eq!(bytes.len(), RECORD_LEN * 2);
        }
    }
}
