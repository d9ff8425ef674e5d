//! # Peer Connection
//!
//! One TCP connection to one remote peer: handshake exchange, the
//! optional post-handshake bitfield, choke/interest state, and the
//! framed message send/receive paths the piece download loop drives.
//!
//! Socket errors are classified into the transport taxonomy here, so
//! the worker can decide between tearing the connection down and
//! recycling the current piece.

use byteorder::{BigEndian, ReadBytesExt};

use std::io::{Cursor, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::bitfield::Bitfield;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, HANDSHAKE_LEN};
use crate::message::Message;
use crate::peer::Peer;

const CONNECT_TIMEOUT_SECS: u64 = 15;
const BITFIELD_PROBE_TIMEOUT_SECS: u64 = 2;

/// A connected remote peer.
pub struct Client {
    /// Address of the remote peer
    peer: Peer,
    /// TCP stream, `None` once the connection has been closed
    conn: Option<TcpStream>,
    /// Pieces the peer advertised, absent until a `bitfield` arrives
    bitfield: Option<Bitfield>,
    /// Whether the peer currently chokes us
    choked: bool,
}

impl Client {
    /// Connect to a peer and perform the handshake.
    ///
    /// Opens the TCP connection, sends our handshake, reads and
    /// verifies the 68-byte reply, then probes briefly for the
    /// customary post-handshake `bitfield` frame. A peer that sends
    /// nothing, or something else first, is still accepted; its
    /// bitfield stays unknown.
    pub fn connect(peer: Peer, info_hash: [u8; 20], peer_id: [u8; 20]) -> Result<Client> {
        let conn = TcpStream::connect_timeout(&peer.addr(), Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .map_err(Error::from_socket)?;

        let mut client = Client {
            peer,
            conn: Some(conn),
            bitfield: None,
            choked: true,
        };

        client.set_connection_timeout(CONNECT_TIMEOUT_SECS)?;
        client.exchange_handshake(info_hash, peer_id)?;
        client.probe_bitfield();

        info!("Connected to peer {}", client.peer);

        Ok(client)
    }

    /// Whether the peer currently chokes us.
    pub fn is_choked(&self) -> bool {
        self.choked
    }

    pub fn set_choked(&mut self, choked: bool) {
        self.choked = choked;
    }

    /// Whether the peer may have piece `index`.
    ///
    /// The bitfield is advisory: a peer that never sent one reads as
    /// "unknown, try anyway".
    pub fn may_have(&self, index: u32) -> bool {
        self.bitfield.as_ref().map_or(true, |b| b.has(index))
    }

    /// Record a `have` announcement. Ignored while the bitfield is
    /// unknown.
    pub fn set_piece(&mut self, index: u32) {
        if let Some(bitfield) = &mut self.bitfield {
            bitfield.set(index);
        }
    }

    /// Set both socket timeouts, guarding against stuck peers.
    pub fn set_connection_timeout(&mut self, secs: u64) -> Result<()> {
        let conn = self.stream()?;
        conn.set_read_timeout(Some(Duration::from_secs(secs)))?;
        conn.set_write_timeout(Some(Duration::from_secs(secs)))?;

        Ok(())
    }

    /// Serialize and send one message.
    pub fn send(&mut self, message: &Message) -> Result<()> {
        debug!("Send {} to peer {}", message.name(), self.peer);
        let encoded = message.serialize();
        self.stream()?
            .write_all(&encoded)
            .map_err(Error::from_socket)
    }

    pub fn send_interested(&mut self) -> Result<()> {
        self.send(&Message::Interested)
    }

    pub fn send_unchoke(&mut self) -> Result<()> {
        self.send(&Message::Unchoke)
    }

    /// Tell the peer we acquired a piece.
    pub fn send_have(&mut self, index: u32) -> Result<()> {
        self.send(&Message::Have(index))
    }

    /// Request `length` bytes of piece `index` starting at `begin`.
    pub fn send_request(&mut self, index: u32, begin: u32, length: u32) -> Result<()> {
        debug!(
            "Send request for piece {} [{}:{}] to peer {}",
            index,
            begin,
            begin + length,
            self.peer
        );
        let encoded = Message::Request {
            index,
            begin,
            length,
        }
        .serialize();
        self.stream()?
            .write_all(&encoded)
            .map_err(Error::from_socket)
    }

    /// Read exactly one frame.
    ///
    /// Blocks until a frame arrives or the read timeout fires. A
    /// zero-length frame surfaces as [`Message::KeepAlive`]; an
    /// unknown id surfaces as [`Error::Unsupported`] with the frame
    /// already consumed from the stream.
    pub fn read(&mut self) -> Result<Message> {
        let frame_len = self.read_frame_len()?;
        if frame_len == 0 {
            debug!("Receive keep-alive from peer {}", self.peer);
            return Ok(Message::KeepAlive);
        }

        let mut payload = vec![0; frame_len];
        self.stream()?
            .read_exact(&mut payload)
            .map_err(Error::from_socket)?;

        Message::parse(&payload)
    }

    /// Close the connection. Idempotent; also drops the bitfield.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.shutdown(Shutdown::Both);
            info!("Closed connection to peer {}", self.peer);
        }
        self.bitfield = None;
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.conn.as_mut().ok_or(Error::EndOfStream)
    }

    fn exchange_handshake(&mut self, info_hash: [u8; 20], peer_id: [u8; 20]) -> Result<()> {
        let handshake = Handshake::new(info_hash, peer_id);
        let encoded = handshake.serialize();

        let conn = self.stream()?;
        conn.write_all(&encoded).map_err(Error::from_socket)?;

        let mut reply = [0; HANDSHAKE_LEN];
        conn.read_exact(&mut reply).map_err(Error::from_socket)?;

        let reply = Handshake::parse(&reply)?;
        if reply.info_hash != info_hash {
            return Err(Error::IncorrectHash);
        }

        Ok(())
    }

    /// One short-timeout read for the customary first frame.
    ///
    /// Retains a `bitfield`, applies choke state changes, ignores
    /// anything else. Absence of a bitfield is not an error.
    fn probe_bitfield(&mut self) {
        if self.set_connection_timeout(BITFIELD_PROBE_TIMEOUT_SECS).is_err() {
            return;
        }

        match self.read() {
            Ok(Message::Bitfield(bytes)) => {
                debug!("Receive bitfield from peer {}", self.peer);
                self.bitfield = Some(Bitfield::from(bytes));
            }
            Ok(Message::Choke) => self.choked = true,
            Ok(Message::Unchoke) => self.choked = false,
            Ok(message) => {
                debug!(
                    "Peer {} opened with {} instead of a bitfield",
                    self.peer,
                    message.name()
                );
            }
            Err(_) => {}
        }
    }

    fn read_frame_len(&mut self) -> Result<usize> {
        let mut buf = [0; 4];
        self.stream()?
            .read_exact(&mut buf)
            .map_err(Error::from_socket)?;

        let frame_len = Cursor::new(buf).read_u32::<BigEndian>()?;

        Ok(frame_len as usize)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
