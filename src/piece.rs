//! # Piece Jobs
//!
//! A [`PieceWork`] is one unit of the shared work queue: a piece index,
//! its expected SHA-1 hash and its exact size. The download buffer is
//! allocated when a worker picks the job up and released again when an
//! attempt fails, so a recycled job sitting in the queue costs nothing.

use boring::sha::Sha1;

use crate::error::{Error, Result};

/// One piece waiting to be downloaded, or in flight on a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PieceWork {
    /// Zero-based index of this piece in the torrent
    pub index: u32,
    /// Expected SHA-1 hash of the piece bytes
    pub hash: [u8; 20],
    /// Exact size of this piece in bytes
    pub length: u32,
    /// Download buffer; empty until a worker starts an attempt
    pub data: Vec<u8>,
}

impl PieceWork {
    pub fn new(index: u32, hash: [u8; 20], length: u32) -> PieceWork {
        PieceWork {
            index,
            hash,
            length,
            data: Vec::new(),
        }
    }

    /// Allocate a fresh zeroed buffer of exactly `length` bytes.
    ///
    /// Called at the start of every download attempt. Allocation
    /// failure is reported instead of aborting so the worker can shut
    /// down cleanly.
    pub fn allocate(&mut self) -> Result<()> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.length as usize)
            .map_err(|_| Error::OutOfMemory)?;
        data.resize(self.length as usize, 0);
        self.data = data;

        Ok(())
    }

    /// Drop the buffer before the job goes back on the queue.
    pub fn release(&mut self) {
        self.data = Vec::new();
    }

    /// Whether the downloaded bytes hash to the expected digest.
    pub fn verify(&self) -> bool {
        let mut hasher = Sha1::new();
        hasher.update(&self.data);
        hasher.finish() == self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release() {
        let mut piece = PieceWork::new(0, [0; 20], 1024);
        assert!(piece.data.is_empty());

        piece.allocate().unwrap();
        assert_eq!(piece.data.len(), 1024);
        assert!(piece.data.iter().all(|&b| b == 0));

        piece.release();
        assert!(piece.data.is_empty());
        assert_eq!(piece.length, 1024);
    }

    #[test]
    fn verify_matches_sha1() {
        let mut hasher = Sha1::new();
        hasher.update(b"abcd");
        let hash = hasher.finish();

        let mut piece = PieceWork::new(0, hash, 4);
        piece.data = b"abcd".to_vec();
        assert!(piece.verify());

        piece.data = b"abce".to_vec();
        assert!(!piece.verify());
    }
}
