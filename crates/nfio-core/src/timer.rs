use std::cell::Cell;
use std::time::Instant;

/// Number of timer points per pass (ready_start, ready_stop, io_start,
/// io_stop, close_start, close_stop).
pub const NB_TIMERS: usize = 6;

pub const TIMER_READY_START: usize = 0;
pub const TIMER_READY_STOP: usize = 1;
pub const TIMER_IO_START: usize = 2;
pub const TIMER_IO_STOP: usize = 3;
pub const TIMER_CLOSE_START: usize = 4;
pub const TIMER_CLOSE_STOP: usize = 5;

/// Timer storage for one coordinated pass on one rank.
///
/// "ready" covers the blocking wait for file access plus the open, "io" the
/// payload transfer, "close" the flush/hand-off in `done()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassTimers {
    pub timers: [f64; NB_TIMERS],
}

impl PassTimers {
    pub fn ready_time(&self) -> f64 {
        self.timers[TIMER_READY_STOP] - self.timers[TIMER_READY_START]
    }
    pub fn io_time(&self) -> f64 {
        self.timers[TIMER_IO_STOP] - self.timers[TIMER_IO_START]
    }
    pub fn close_time(&self) -> f64 {
        self.timers[TIMER_CLOSE_STOP] - self.timers[TIMER_CLOSE_START]
    }
    /// Total time from ready_start to close_stop.
    pub fn total_time(&self) -> f64 {
        self.timers[TIMER_CLOSE_STOP] - self.timers[TIMER_READY_START]
    }
}

thread_local! {
    /// Per-thread monotonic epoch, lazily initialized on first call to `now()`.
    static EPOCH: Cell<Option<Instant>> = const { Cell::new(None) };
}

/// Current timestamp in seconds (monotonic, relative to first call on this
/// thread).
pub fn now() -> f64 {
    EPOCH.with(|cell| {
        let epoch = match cell.get() {
            Some(e) => e,
            None => {
                let e = Instant::now();
                cell.set(Some(e));
                e
            }
        };
        epoch.elapsed().as_secs_f64()
    })
}
