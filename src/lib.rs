//! # Remora
//!
//! A single-file BitTorrent leecher: given a `.torrent` descriptor and
//! a destination, it announces to the tracker, discovers peers, and
//! concurrently downloads and verifies every piece of the described
//! file.
//!
//! ## Architecture
//!
//! The engine is a pool of preemptive worker threads over one shared
//! work queue:
//!
//! - **Orchestrator** ([`torrent::Torrent::download`]): parses the
//!   metainfo, announces, builds one job per piece, owns the output
//!   file, joins the pool.
//! - **Workers** ([`worker::Worker`]): one per claimed peer; each owns
//!   its TCP connection and drives the pipelined block request loop.
//! - **Queue** ([`queue::WorkQueue`]): the single mutex-guarded shared
//!   state; failed jobs are recycled, verified pieces are written at
//!   their offset in the output file.
//!
//! Blocking I/O only; no async runtime.

#[macro_use]
extern crate log;

pub mod bitfield;
pub mod client;
pub mod error;
pub mod handshake;
pub mod message;
pub mod peer;
pub mod piece;
pub mod queue;
pub mod torrent;
pub mod tracker;
pub mod worker;

pub use error::{Error, Result};
pub use torrent::Torrent;
