//! In-process communicator: one thread per simulated rank.
//!
//! Each rank owns a mailbox; a blocking receive scans the mailbox for the
//! first message matching `(source, tag)` and parks on a condvar until one
//! arrives. Delivery order is FIFO per sender/tag pair, which is the same
//! ordering guarantee MPI point-to-point gives.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Barrier, Condvar, Mutex};

use super::{Comm, Message, Rank, Tag};

/// First tag handed out by the allocator. Leaves low tag values unused so
/// accidental raw-integer tags stand out in traces.
const TAG_ALLOC_BASE: i32 = 100;

struct Envelope {
    source: Rank,
    tag: Tag,
    value: i32,
}

struct Mailbox {
    queue: Mutex<Vec<Envelope>>,
    arrived: Condvar,
}

struct World {
    mailboxes: Vec<Mailbox>,
    barrier: Barrier,
    num_procs: i32,
}

/// One rank's endpoint into a [`LocalWorld`].
pub struct LocalComm {
    world: Arc<World>,
    rank: Rank,
    tags: AtomicI32,
}

/// Factory for a group of in-process rank endpoints.
pub struct LocalWorld;

impl LocalWorld {
    /// Create `num_procs` endpoints sharing one world. Each endpoint is
    /// meant to be moved onto its own thread.
    pub fn endpoints(num_procs: i32) -> Vec<LocalComm> {
        assert!(num_procs > 0);
        let world = Arc::new(World {
            mailboxes: (0..num_procs)
                .map(|_| Mailbox {
                    queue: Mutex::new(Vec::new()),
                    arrived: Condvar::new(),
                })
                .collect(),
            barrier: Barrier::new(num_procs as usize),
            num_procs,
        });
        (0..num_procs)
            .map(|rank| LocalComm {
                world: Arc::clone(&world),
                rank,
                tags: AtomicI32::new(TAG_ALLOC_BASE),
            })
            .collect()
    }
}

impl LocalComm {
    fn recv_matching(&self, matches: impl Fn(&Envelope) -> bool) -> Message {
        let mailbox = &self.world.mailboxes[self.rank as usize];
        let mut queue = mailbox.queue.lock().unwrap();
        loop {
            if let Some(pos) = queue.iter().position(&matches) {
                let env = queue.remove(pos);
                return Message {
                    source: env.source,
                    value: env.value,
                };
            }
            queue = mailbox.arrived.wait(queue).unwrap();
        }
    }
}

impl Comm for LocalComm {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn num_procs(&self) -> i32 {
        self.world.num_procs
    }

    fn send(&self, value: i32, dest: Rank, tag: Tag) {
        let mailbox = &self.world.mailboxes[dest as usize];
        mailbox.queue.lock().unwrap().push(Envelope {
            source: self.rank,
            tag,
            value,
        });
        mailbox.arrived.notify_all();
    }

    fn recv(&self, source: Rank, tag: Tag) -> i32 {
        self.recv_matching(|env| env.source == source && env.tag == tag)
            .value
    }

    fn recv_any(&self, tag: Tag) -> Message {
        self.recv_matching(|env| env.tag == tag)
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }

    fn alloc_tags(&self, count: i32) -> Tag {
        self.tags.fetch_add(count, Ordering::Relaxed)
    }
}
