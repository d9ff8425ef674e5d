//! # Torrent Metainfo and Download Orchestration
//!
//! Parses a `.torrent` file into a validated descriptor and drives the
//! download: announce to the tracker, build one job per piece, create
//! the destination file, spawn one worker thread per claimed peer and
//! join them.
//!
//! ## Metainfo
//!
//! The descriptor is bencoded:
//!
//! - **announce**: tracker URL
//! - **info**: `name`, `piece length`, `pieces` (concatenated 20-byte
//!   SHA-1 hashes) and either `length` (single file) or `files`
//!   (multi-file)
//!
//! The info hash that identifies the torrent on the wire is the SHA-1
//! of the info dictionary exactly as it re-encodes; the bencode
//! serializer emits canonically sorted keys, which is what trackers
//! and peers expect.

use boring::sha::Sha1;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_bencode::{de, ser};
use serde_bytes::ByteBuf;

use std::fs::{File, OpenOptions};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crate::error::{Error, Result};
use crate::piece::PieceWork;
use crate::queue::WorkQueue;
use crate::tracker;
use crate::worker::Worker;

/// Port reported to the tracker. The engine never listens; the value
/// is the conventional BitTorrent port.
const PORT: u16 = 6881;

const SHA1_HASH_SIZE: usize = 20;

/// Azureus-style client tag carried in every peer id.
const PEER_ID_PREFIX: &[u8; 8] = b"-RM0010-";

/// A parsed and validated torrent descriptor.
#[derive(Debug, Clone)]
pub struct Torrent {
    /// Tracker URL for peer discovery
    announce: String,
    /// 20-byte SHA-1 hash of the bencoded info dictionary
    info_hash: [u8; 20],
    /// One expected SHA-1 hash per piece
    piece_hashes: Vec<[u8; 20]>,
    /// Size of each piece in bytes (except possibly the last)
    piece_length: u32,
    /// Total payload size in bytes
    total_size: u64,
    /// Suggested output filename from the metainfo
    name: String,
    /// Identifier this client presents to tracker and peers
    peer_id: [u8; 20],
}

/// One entry of a multi-file info dictionary.
#[derive(Debug, Deserialize, Serialize)]
struct BencodeFile {
    length: u64,
    path: Vec<String>,
}

/// The info sub-dictionary, in canonical key order.
#[derive(Debug, Deserialize, Serialize)]
struct BencodeInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    files: Option<Vec<BencodeFile>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    length: Option<u64>,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u32,
    pieces: ByteBuf,
}

#[derive(Debug, Deserialize, Serialize)]
struct BencodeTorrent {
    #[serde(default)]
    announce: String,
    info: BencodeInfo,
}

impl BencodeInfo {
    /// Hash the re-encoded info dictionary to identify the torrent.
    fn hash(&self) -> Result<[u8; 20]> {
        let encoded: Vec<u8> = ser::to_bytes(self)?;

        let mut hasher = Sha1::new();
        hasher.update(&encoded);

        Ok(hasher.finish())
    }

    /// Slice the pieces blob into per-piece hashes.
    fn split_piece_hashes(&self) -> Result<Vec<[u8; 20]>> {
        if self.pieces.is_empty() {
            return Err(Error::EmptyPieces);
        }
        if !self.pieces.len().is_multiple_of(SHA1_HASH_SIZE) {
            return Err(Error::PiecesNotMultipleOf20);
        }

        let hashes = self
            .pieces
            .chunks_exact(SHA1_HASH_SIZE)
            .map(|chunk| {
                let mut hash = [0; SHA1_HASH_SIZE];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        Ok(hashes)
    }

    /// Single-file length, or the sum over the file list.
    fn total_size(&self) -> u64 {
        match (&self.length, &self.files) {
            (Some(length), _) => *length,
            (None, Some(files)) => files.iter().map(|f| f.length).sum(),
            (None, None) => 0,
        }
    }
}

impl Torrent {
    /// Read and validate a `.torrent` file.
    pub fn open(path: &Path) -> Result<Torrent> {
        if path.extension().map_or(true, |ext| ext != "torrent") {
            return Err(Error::WrongFormat);
        }

        let mut buf = Vec::new();
        File::open(path)?.read_to_end(&mut buf)?;

        Torrent::from_bytes(&buf)
    }

    /// Parse raw metainfo bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Torrent> {
        let bencode = de::from_bytes::<BencodeTorrent>(buf)?;

        let torrent = Torrent {
            announce: bencode.announce.clone(),
            info_hash: bencode.info.hash()?,
            piece_hashes: bencode.info.split_piece_hashes()?,
            piece_length: bencode.info.piece_length,
            total_size: bencode.info.total_size(),
            name: bencode.info.name.clone(),
            peer_id: generate_peer_id(),
        };

        info!(
            "Opened torrent {:?}: {} bytes in {} pieces of {} bytes",
            torrent.name,
            torrent.total_size,
            torrent.piece_hashes.len(),
            torrent.piece_length
        );

        Ok(torrent)
    }

    /// Suggested output filename from the metainfo.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn piece_count(&self) -> usize {
        self.piece_hashes.len()
    }

    pub fn info_hash(&self) -> [u8; 20] {
        self.info_hash
    }

    /// Exact size of piece `index`: `piece_length` for every piece but
    /// possibly the last.
    pub fn piece_size(&self, index: u32) -> u32 {
        let begin = index as u64 * self.piece_length as u64;
        let end = (begin + self.piece_length as u64).min(self.total_size);

        end.saturating_sub(begin) as u32
    }

    /// Download the torrent into `out_path`.
    ///
    /// Announces once, creates the destination file exclusively, then
    /// runs the worker pool until every piece is verified and written.
    /// All workers exiting with pieces still pending is a stall and is
    /// reported as such rather than hanging.
    pub fn download(&self, out_path: &Path) -> Result<()> {
        let peers = tracker::announce(
            &self.announce,
            &self.info_hash,
            &self.peer_id,
            PORT,
            self.total_size,
        )?;

        self.download_from(peers, out_path)
    }

    /// Run the download engine against an already known peer set.
    pub fn download_from(&self, peers: Vec<crate::peer::Peer>, out_path: &Path) -> Result<()> {
        println!(
            "Downloading {:?} ({} pieces)",
            self.name,
            self.piece_hashes.len()
        );

        let jobs: Vec<PieceWork> = self
            .piece_hashes
            .iter()
            .enumerate()
            .map(|(index, &hash)| PieceWork::new(index as u32, hash, self.piece_size(index as u32)))
            .collect();

        let output = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(out_path)?;

        let n_workers = peers
            .len()
            .min(thread::available_parallelism().map_or(1, |n| n.get()));
        info!("Spawning {} workers for {} peers", n_workers, peers.len());

        let queue = Arc::new(WorkQueue::new(
            jobs,
            peers,
            output,
            self.piece_length,
            self.total_size,
        ));

        let mut handles = Vec::with_capacity(n_workers);
        for _ in 0..n_workers {
            let worker = Worker::new(Arc::clone(&queue), self.info_hash, self.peer_id);
            handles.push(thread::spawn(move || worker.run()));
        }
        for handle in handles {
            let _ = handle.join();
        }

        queue.finish()?;

        if !queue.is_complete() {
            return Err(Error::StalledDownload);
        }

        Ok(())
    }
}

/// A fresh 20-byte peer id: the client tag plus 12 random
/// alphanumerics.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0; 20];
    peer_id[..8].copy_from_slice(PEER_ID_PREFIX);

    let mut rng = rand::thread_rng();
    for byte in peer_id[8..].iter_mut() {
        *byte = rng.sample(Alphanumeric);
    }

    peer_id
}
