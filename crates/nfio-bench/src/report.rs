use mpi::collective::SystemOperation;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use nfio_core::timer::{NB_TIMERS, PassTimers};

const MEBIBYTE: f64 = 1_048_576.0;

/// Per-repetition result for one coordinated pass.
#[derive(Debug, Clone)]
pub struct PassResult {
    /// "static write", "dynamic write", or "read"
    pub access: String,
    /// Aggregate bandwidth in bytes/sec
    pub bw: f64,
    /// Wait-for-access + open phase time
    pub ready_time: f64,
    /// Payload transfer phase time
    pub io_time: f64,
    /// Flush/close/hand-off phase time
    pub close_time: f64,
    /// Total time from first ready to last close
    pub total_time: f64,
    /// Aggregate bytes moved across all ranks
    pub data_moved: i64,
    /// Repetition number
    pub rep: i32,
}

/// Reduce pass timers across ranks: even indices (phase starts) take the
/// minimum, odd indices (phase stops) the maximum. Only rank 0 gets
/// meaningful reduced values.
pub fn reduce_timers(timers: &PassTimers, comm: &SimpleCommunicator) -> PassTimers {
    let rank = comm.rank();
    let root = comm.process_at_rank(0);

    let mut reduced = PassTimers::default();

    for i in 0..NB_TIMERS {
        let val = timers.timers[i];
        let op = if i % 2 == 0 {
            SystemOperation::min()
        } else {
            SystemOperation::max()
        };
        if rank == 0 {
            root.reduce_into_root(&val, &mut reduced.timers[i], op);
        } else {
            root.reduce_into(&val, op);
        }
    }

    reduced
}

/// Aggregate bytes moved across all ranks.
pub fn reduce_data_moved(local: i64, comm: &SimpleCommunicator) -> i64 {
    let mut agg: i64 = 0;
    comm.all_reduce_into(&local, &mut agg, SystemOperation::sum());
    agg
}

/// Build a [`PassResult`] from the reduced timers.
pub fn compute_result(
    access: &str,
    reduced: &PassTimers,
    data_moved: i64,
    rep: i32,
) -> PassResult {
    let total = reduced.total_time();
    let bw = if total > 0.0 {
        data_moved as f64 / total
    } else {
        0.0
    };
    PassResult {
        access: access.to_string(),
        bw,
        ready_time: reduced.ready_time(),
        io_time: reduced.io_time(),
        close_time: reduced.close_time(),
        total_time: total,
        data_moved,
        rep,
    }
}

pub fn print_header(comm: &SimpleCommunicator) {
    if comm.rank() == 0 {
        println!(
            "{:<14} {:>10} {:>10} {:>10} {:>10} {:>10} {:>5}",
            "access", "bw(MiB/s)", "ready(s)", "io(s)", "close(s)", "total(s)", "rep"
        );
        println!("{:-<74}", "");
    }
}

pub fn print_result(result: &PassResult, comm: &SimpleCommunicator) {
    if comm.rank() == 0 {
        println!(
            "{:<14} {:>10.2} {:>10.4} {:>10.4} {:>10.4} {:>10.4} {:>5}",
            result.access,
            result.bw / MEBIBYTE,
            result.ready_time,
            result.io_time,
            result.close_time,
            result.total_time,
            result.rep
        );
    }
}

/// Min/mean/max bandwidth over repetitions (rank 0 only).
pub fn print_summary(access: &str, results: &[PassResult], comm: &SimpleCommunicator) {
    if comm.rank() != 0 || results.is_empty() {
        return;
    }
    let bws: Vec<f64> = results.iter().map(|r| r.bw / MEBIBYTE).collect();
    let min = bws.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = bws.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = bws.iter().sum::<f64>() / bws.len() as f64;
    println!(
        "summary {:<14} reps={} bwMiB min/mean/max = {:.2}/{:.2}/{:.2}",
        access,
        results.len(),
        min,
        mean,
        max
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_result_bandwidth() {
        let mut t = PassTimers::default();
        t.timers = [0.0, 0.5, 0.5, 2.0, 2.0, 2.0];
        let r = compute_result("static write", &t, 4 * 1024 * 1024, 1);
        assert_eq!(r.access, "static write");
        assert_eq!(r.rep, 1);
        assert!((r.total_time - 2.0).abs() < 1e-12);
        assert!((r.bw - 2.0 * MEBIBYTE).abs() < 1e-6);
    }

    #[test]
    fn test_compute_result_zero_time() {
        let t = PassTimers::default();
        let r = compute_result("read", &t, 1024, 0);
        assert_eq!(r.bw, 0.0);
    }
}
