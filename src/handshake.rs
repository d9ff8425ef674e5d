//! # BitTorrent Handshake
//!
//! The fixed 68-byte message exchanged immediately after the TCP
//! connection is established:
//!
//! ```text
//! <pstrlen=19><pstr="BitTorrent protocol"><reserved: 8 zero bytes><info_hash: 20><peer_id: 20>
//! ```
//!
//! The info hash binds the connection to one torrent; a peer answering
//! with a different hash is talking about another swarm and must be
//! dropped.

use crate::error::{Error, Result};

const PROTOCOL_ID: &[u8; 19] = b"BitTorrent protocol";

/// Serialized handshake size: 1 + 19 + 8 + 20 + 20.
pub const HANDSHAKE_LEN: usize = 68;

/// One side of the BitTorrent handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// 20-byte SHA-1 hash of the torrent's info dictionary
    pub info_hash: [u8; 20],
    /// 20-byte identifier of the sending peer
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Handshake {
        Handshake { info_hash, peer_id }
    }

    /// Serialize into the fixed wire buffer in one pass.
    pub fn serialize(&self) -> [u8; HANDSHAKE_LEN] {
        let mut buf = [0; HANDSHAKE_LEN];

        buf[0] = PROTOCOL_ID.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL_ID);
        // bytes 20..28 stay zero (reserved)
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);

        buf
    }

    /// Parse a received 68-byte handshake.
    ///
    /// The length byte must be 19 and the protocol string must be
    /// `"BitTorrent protocol"`, otherwise the peer is not speaking
    /// BitTorrent v1 and the handshake is rejected.
    pub fn parse(buf: &[u8; HANDSHAKE_LEN]) -> Result<Handshake> {
        if buf[0] as usize != PROTOCOL_ID.len() || &buf[1..20] != PROTOCOL_ID {
            return Err(Error::BadHandshake);
        }

        let mut info_hash = [0; 20];
        let mut peer_id = [0; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Handshake { info_hash, peer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let handshake = Handshake::new([0xAB; 20], [0xCD; 20]);
        let buf = handshake.serialize();
        assert_eq!(Handshake::parse(&buf).unwrap(), handshake);
    }

    #[test]
    fn wire_layout() {
        let handshake = Handshake::new([0; 20], [0; 20]);
        let buf = handshake.serialize();

        assert_eq!(buf.len(), 68);
        assert_eq!(buf[0], 0x13);
        assert_eq!(&buf[1..20], b"BitTorrent protocol");
        assert_eq!(&buf[20..28], &[0; 8]);
    }

    #[test]
    fn rejects_wrong_protocol() {
        let mut buf = Handshake::new([1; 20], [2; 20]).serialize();
        buf[0] = 18;
        assert!(matches!(Handshake::parse(&buf), Err(Error::BadHandshake)));

        let mut buf = Handshake::new([1; 20], [2; 20]).serialize();
        buf[5] = b'x';
        assert!(matches!(Handshake::parse(&buf), Err(Error::BadHandshake)));
    }
}
