//! # Peer Addresses
//!
//! Trackers answer announces with the compact peer list of BEP 23: a
//! byte string of 6-byte records, 4 bytes of big-endian IPv4 address
//! followed by 2 bytes of big-endian port.

use byteorder::{BigEndian, ReadBytesExt};

use std::fmt;
use std::io::Cursor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::{Error, Result};

const COMPACT_PEER_LEN: usize = 6;

/// A remote peer discovered through the tracker.
///
/// Identity is the address; the set of peers handed to the worker pool
/// is deduplicated on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Peer {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Peer {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.ip), self.port)
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Decode a compact peer list.
///
/// Fails only when the input is not a whole number of records.
/// Records that decode to an unusable address (the unspecified address
/// or port 0) are dropped without failing the batch.
pub fn from_compact(bytes: &[u8]) -> Result<Vec<Peer>> {
    if !bytes.len().is_multiple_of(COMPACT_PEER_LEN) {
        return Err(Error::MalformedPeerList);
    }

    let mut peers = Vec::with_capacity(bytes.len() / COMPACT_PEER_LEN);
    for record in bytes.chunks_exact(COMPACT_PEER_LEN) {
        let ip = Ipv4Addr::new(record[0], record[1], record[2], record[3]);
        let port = Cursor::new(&record[4..]).read_u16::<BigEndian>()?;

        if ip.is_unspecified() || port == 0 {
            debug!("Dropping unusable peer address {}:{}", ip, port);
            continue;
        }
        peers.push(Peer { ip, port });
    }

    Ok(peers)
}
