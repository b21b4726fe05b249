//! Read sessions: ordered shared-file read access for an explicit rank
//! subset.
//!
//! The caller supplies the ordered list of participating ranks; position 0
//! opens immediately, every other participant waits for a wake message from
//! its predecessor in the list. Ranks absent from the list are born
//! finished. One read pass per session instance.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;

use crate::comm::{Comm, Rank, Tag};
use crate::error::NfioError;
use crate::write::DEFAULT_BUFFER_SIZE;

/// Per-rank state machine for one ordered shared-file read pass.
pub struct ReadSession<'a> {
    comm: &'a dyn Comm,
    path: String,
    reader_ranks: Vec<Rank>,
    /// Position in `reader_ranks`, `None` when this rank does not
    /// participate.
    my_index: Option<usize>,
    buffer_size: usize,
    stream: Option<BufReader<File>>,
    finished: bool,
    chain_tag: Tag,
}

impl<'a> ReadSession<'a> {
    /// Create a read session over `path` for the given ordered reader list.
    ///
    /// A duplicate rank in the list is a precondition violation and fails
    /// the whole run. Every rank must construct the session (SPMD symmetry
    /// keeps the tag allocators aligned); non-participants are finished
    /// immediately.
    pub fn new(
        comm: &'a dyn Comm,
        path: impl Into<String>,
        reader_ranks: Vec<Rank>,
        buffer_size: Option<usize>,
    ) -> Result<Self, NfioError> {
        let mut seen = HashSet::new();
        for &rank in &reader_ranks {
            if !seen.insert(rank) {
                return Err(NfioError::DuplicateReadRank { rank });
            }
        }

        let my_index = reader_ranks.iter().position(|&r| r == comm.rank());
        let chain_tag = comm.next_tag();

        Ok(Self {
            comm,
            path: path.into(),
            reader_ranks,
            my_index,
            buffer_size: buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE),
            stream: None,
            finished: my_index.is_none(),
            chain_tag,
        })
    }

    /// Block until this rank may read, then open the file.
    ///
    /// Returns `Ok(false)` when there is nothing to read: the rank is not
    /// in the reader list, or the single pass already completed.
    pub fn ready_to_read(&mut self) -> Result<bool, NfioError> {
        if self.finished {
            return Ok(false);
        }

        // Index is Some here, otherwise the session started finished.
        let index = self.my_index.unwrap_or(0);
        if index > 0 {
            let predecessor = self.reader_ranks[index - 1];
            let _ = self.comm.recv(predecessor, self.chain_tag);
        }

        let file = File::open(&self.path).map_err(|source| NfioError::FileOpen {
            path: self.path.clone(),
            source,
        })?;
        self.stream = Some(BufReader::with_capacity(self.buffer_size, file));
        Ok(true)
    }

    /// Finish this rank's read: close the file and wake the successor in
    /// the list, if any.
    pub fn done(&mut self) -> Result<(), NfioError> {
        if self.finished {
            return Ok(());
        }
        self.stream = None;
        self.finished = true;

        let index = self.my_index.unwrap_or(0);
        if index + 1 < self.reader_ranks.len() {
            let successor = self.reader_ranks[index + 1];
            self.comm.send(0, successor, self.chain_tag);
        }
        Ok(())
    }

    /// The open stream, once `ready_to_read` returned true.
    pub fn reader(&mut self) -> Option<&mut BufReader<File>> {
        self.stream.as_mut()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
