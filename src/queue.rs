//! # Shared Work Queue
//!
//! The one shared-mutable entity of the download: a mutex-guarded
//! tuple of (pending piece jobs, unclaimed peers, output file, write
//! counters). Workers pop jobs, recycle the ones that fail, and funnel
//! verified pieces through [`WorkQueue::write`], which places each
//! piece at `index * piece_length` in the output file.
//!
//! Every critical section is O(1) except `write`, which performs one
//! positional file write of at most one piece.

use indicatif::{ProgressBar, ProgressStyle};

use std::collections::VecDeque;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::error::Result;
use crate::peer::Peer;
use crate::piece::PieceWork;

pub struct WorkQueue {
    shared: Mutex<Shared>,
    piece_length: u32,
    n_pieces: usize,
    progress: ProgressBar,
}

struct Shared {
    /// Pending jobs, FIFO; recycled jobs go to the tail
    jobs: VecDeque<PieceWork>,
    /// Peers not yet claimed by a worker
    peer_slots: Vec<Peer>,
    /// Destination file, created exclusively by the orchestrator
    output: File,
    /// Pieces verified and written so far
    written: usize,
    /// Bytes verified and written so far
    downloaded_bytes: u64,
}

impl WorkQueue {
    pub fn new(
        jobs: Vec<PieceWork>,
        peers: Vec<Peer>,
        output: File,
        piece_length: u32,
        total_size: u64,
    ) -> WorkQueue {
        let n_pieces = jobs.len();

        let progress = ProgressBar::new(total_size);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}%")
                .unwrap()
                .progress_chars("#>-"),
        );

        WorkQueue {
            shared: Mutex::new(Shared {
                jobs: VecDeque::from(jobs),
                peer_slots: peers,
                output,
                written: 0,
                downloaded_bytes: 0,
            }),
            piece_length,
            n_pieces,
            progress,
        }
    }

    /// Hand out one peer. Each peer goes to at most one worker for the
    /// lifetime of the download; `None` once all slots are taken.
    pub fn take_peer_slot(&self) -> Option<Peer> {
        let mut shared = self.shared.lock().unwrap();
        shared.peer_slots.pop()
    }

    /// Remove and return a pending job; `None` when the queue is empty.
    pub fn pop_job(&self) -> Option<PieceWork> {
        let mut shared = self.shared.lock().unwrap();
        shared.jobs.pop_front()
    }

    /// Return a job to the tail of the queue.
    pub fn push_job(&self, job: PieceWork) {
        let mut shared = self.shared.lock().unwrap();
        shared.jobs.push_back(job);
    }

    /// Write a verified piece at its offset in the output file.
    ///
    /// Consumes the job and its buffer. The first piece starts at
    /// offset 0; every piece except possibly the last is exactly
    /// `piece_length` bytes, so offsets never overlap.
    pub fn write(&self, job: PieceWork) -> Result<()> {
        let offset = job.index as u64 * self.piece_length as u64;

        let mut shared = self.shared.lock().unwrap();
        shared.output.seek(SeekFrom::Start(offset))?;
        shared.output.write_all(&job.data)?;
        shared.written += 1;
        shared.downloaded_bytes += job.data.len() as u64;

        self.progress.inc(job.data.len() as u64);
        debug!(
            "Wrote piece {} ({} bytes) at offset {}",
            job.index,
            job.data.len(),
            offset
        );

        Ok(())
    }

    /// Number of jobs still pending (not in flight, not written).
    pub fn pending(&self) -> usize {
        self.shared.lock().unwrap().jobs.len()
    }

    /// True once every piece has been verified and written.
    pub fn is_complete(&self) -> bool {
        let shared = self.shared.lock().unwrap();
        shared.written == self.n_pieces
    }

    /// Bytes written so far.
    pub fn downloaded_bytes(&self) -> u64 {
        self.shared.lock().unwrap().downloaded_bytes
    }

    /// Flush the output file and finish the progress display.
    pub fn finish(&self) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        shared.output.flush()?;
        self.progress.finish_and_clear();

        Ok(())
    }
}
