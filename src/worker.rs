//! # Download Worker
//!
//! One worker per active peer connection. A worker claims a peer slot,
//! connects, then drains the shared queue: for each job it checks the
//! peer's bitfield, runs the pipelined block request loop, verifies
//! the piece hash and hands the bytes to the writer.
//!
//! Failure routing follows the error taxonomy: a severe transport
//! error (reset, end of stream, allocation failure) or a protocol
//! anomaly tears this connection down and recycles the job; any other
//! error just recycles the job and tries the next one on the same
//! connection. A single lost peer never fails the download.

use std::sync::Arc;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::piece::PieceWork;
use crate::queue::WorkQueue;

/// Maximum number of unanswered block requests per connection.
const MAX_BACKLOG: u32 = 5;

/// Maximum block size requested from a peer (16 KiB).
const MAX_BLOCK: u32 = 16384;

/// Socket timeout while a piece download is in flight.
const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Drives the download of pieces from a single peer.
pub struct Worker {
    queue: Arc<WorkQueue>,
    info_hash: [u8; 20],
    peer_id: [u8; 20],
}

impl Worker {
    pub fn new(queue: Arc<WorkQueue>, info_hash: [u8; 20], peer_id: [u8; 20]) -> Worker {
        Worker {
            queue,
            info_hash,
            peer_id,
        }
    }

    /// Run until the queue drains or the peer becomes unusable.
    pub fn run(&self) {
        let peer = match self.queue.take_peer_slot() {
            Some(peer) => peer,
            None => return,
        };

        let mut client = match Client::connect(peer, self.info_hash, self.peer_id) {
            Ok(client) => client,
            Err(e) => {
                debug!("Could not connect to peer {}: {}", peer, e);
                return;
            }
        };

        // Historically clients also unchoke here; peers tolerate it.
        if client.send_unchoke().is_err() || client.send_interested().is_err() {
            client.close();
            return;
        }

        while let Some(mut job) = self.queue.pop_job() {
            // Advisory check; the peer may acquire the piece later.
            if !client.may_have(job.index) {
                self.queue.push_job(job);
                continue;
            }

            if let Err(e) = self.download_piece(&mut client, &mut job) {
                debug!("Piece {} failed on peer {}: {}", job.index, peer, e);
                job.release();
                self.queue.push_job(job);
                if e.is_connection_fatal() {
                    client.close();
                    return;
                }
                continue;
            }

            if !job.verify() {
                warn!("Piece {} from peer {} failed its hash check", job.index, peer);
                job.release();
                self.queue.push_job(job);
                continue;
            }
            info!("Verified piece {} from peer {}", job.index, peer);

            if client.send_have(job.index).is_err() {
                debug!("Could not send have for piece {} to peer {}", job.index, peer);
            }

            if let Err(e) = self.queue.write(job) {
                // A writer failure is unrecoverable for this download;
                // the orchestrator reports the stall.
                error!("Could not write piece to output file: {}", e);
                client.close();
                return;
            }
        }

        client.close();
    }

    /// Download one piece with a bounded request pipeline.
    ///
    /// Keeps up to [`MAX_BACKLOG`] requests of at most [`MAX_BLOCK`]
    /// bytes in flight while unchoked, and consumes one frame per
    /// iteration until every block of the piece has arrived. The
    /// caller verifies the hash.
    fn download_piece(&self, client: &mut Client, job: &mut PieceWork) -> Result<()> {
        client.set_connection_timeout(DOWNLOAD_TIMEOUT_SECS)?;
        job.allocate()?;

        let mut downloaded: u32 = 0;
        let mut requested: u32 = 0;
        let mut backlog: u32 = 0;

        while downloaded < job.length {
            if !client.is_choked() {
                while backlog < MAX_BACKLOG && requested < job.length {
                    let block_size = MAX_BLOCK.min(job.length - requested);

                    client.send_request(job.index, requested, block_size)?;
                    backlog += 1;
                    requested += block_size;
                }
            }

            match client.read() {
                Ok(Message::KeepAlive) => {}
                Ok(Message::Choke) => {
                    debug!("Peer choked us, waiting for unchoke");
                    client.set_choked(true);
                }
                Ok(Message::Unchoke) => {
                    debug!("Peer unchoked us, resuming requests");
                    client.set_choked(false);
                }
                Ok(Message::Have(index)) => client.set_piece(index),
                Ok(Message::Piece {
                    index,
                    begin,
                    block,
                }) => {
                    if index != job.index {
                        return Err(Error::IncorrectIndex);
                    }
                    let begin = begin as usize;
                    if begin + block.len() > job.data.len() {
                        return Err(Error::IncorrectOffset);
                    }

                    job.data[begin..begin + block.len()].copy_from_slice(&block);
                    downloaded += block.len() as u32;
                    backlog = backlog.saturating_sub(1);
                }
                // A late bitfield, or request/cancel chatter from the
                // peer's upload side.
                Ok(message) => debug!("Ignoring {} during piece download", message.name()),
                Err(Error::Unsupported(id)) => {
                    debug!("Skipping unsupported message id {}", id);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
