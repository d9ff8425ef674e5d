//! # Peer Wire Messages
//!
//! Length-prefixed typed codec for the peer wire protocol. Every frame
//! is a big-endian `u32` length followed by `length` bytes; a length of
//! zero is a keep-alive, otherwise byte 0 of the payload is the message
//! id:
//!
//! | ID | Name | Payload |
//! |----|------|---------|
//! | 0 | `choke` | none |
//! | 1 | `unchoke` | none |
//! | 2 | `interested` | none |
//! | 3 | `not interested` | none |
//! | 4 | `have` | piece index |
//! | 5 | `bitfield` | raw bitfield bytes |
//! | 6 | `request` | index, begin, length |
//! | 7 | `piece` | index, begin, block bytes |
//! | 8 | `cancel` | index, begin, length |
//!
//! Unknown ids surface as [`Error::Unsupported`] after the whole frame
//! has been consumed, so the caller can skip the message without
//! tearing down the connection.

use byteorder::{BigEndian, ReadBytesExt};

use std::io::Cursor;

use crate::error::{Error, Result};

pub const MESSAGE_CHOKE: u8 = 0;
pub const MESSAGE_UNCHOKE: u8 = 1;
pub const MESSAGE_INTERESTED: u8 = 2;
pub const MESSAGE_NOT_INTERESTED: u8 = 3;
pub const MESSAGE_HAVE: u8 = 4;
pub const MESSAGE_BITFIELD: u8 = 5;
pub const MESSAGE_REQUEST: u8 = 6;
pub const MESSAGE_PIECE: u8 = 7;
pub const MESSAGE_CANCEL: u8 = 8;

/// One decoded peer wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// The zero-length frame; carries no id.
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have(u32),
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Serialize the message with its length prefix.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf: Vec<u8> = Vec::with_capacity(4 + 1 + self.payload_len());

        // The length prefix counts the id byte plus the payload.
        let frame_len = match self {
            Message::KeepAlive => 0,
            _ => 1 + self.payload_len(),
        };
        buf.extend_from_slice(&(frame_len as u32).to_be_bytes());

        match self {
            Message::KeepAlive => {}
            Message::Choke => buf.push(MESSAGE_CHOKE),
            Message::Unchoke => buf.push(MESSAGE_UNCHOKE),
            Message::Interested => buf.push(MESSAGE_INTERESTED),
            Message::NotInterested => buf.push(MESSAGE_NOT_INTERESTED),
            Message::Have(index) => {
                buf.push(MESSAGE_HAVE);
                buf.extend_from_slice(&index.to_be_bytes());
            }
            Message::Bitfield(bytes) => {
                buf.push(MESSAGE_BITFIELD);
                buf.extend_from_slice(bytes);
            }
            Message::Request {
                index,
                begin,
                length,
            } => {
                buf.push(MESSAGE_REQUEST);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
            }
            Message::Piece {
                index,
                begin,
                block,
            } => {
                buf.push(MESSAGE_PIECE);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(block);
            }
            Message::Cancel {
                index,
                begin,
                length,
            } => {
                buf.push(MESSAGE_CANCEL);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
            }
        }

        buf
    }

    /// Parse a frame payload (everything after the length prefix).
    ///
    /// An empty payload is the keep-alive. The payload of `bitfield`
    /// and `piece` is moved into the returned message; the fixed-size
    /// variants do not allocate.
    pub fn parse(payload: &[u8]) -> Result<Message> {
        if payload.is_empty() {
            return Ok(Message::KeepAlive);
        }

        let id = payload[0];
        let mut body = Cursor::new(&payload[1..]);
        let body_len = payload.len() - 1;

        let message = match id {
            MESSAGE_CHOKE => Message::Choke,
            MESSAGE_UNCHOKE => Message::Unchoke,
            MESSAGE_INTERESTED => Message::Interested,
            MESSAGE_NOT_INTERESTED => Message::NotInterested,
            MESSAGE_HAVE => {
                if body_len != 4 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Have(body.read_u32::<BigEndian>()?)
            }
            MESSAGE_BITFIELD => Message::Bitfield(payload[1..].to_vec()),
            MESSAGE_REQUEST => {
                if body_len != 12 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Request {
                    index: body.read_u32::<BigEndian>()?,
                    begin: body.read_u32::<BigEndian>()?,
                    length: body.read_u32::<BigEndian>()?,
                }
            }
            MESSAGE_PIECE => {
                if body_len < 8 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Piece {
                    index: body.read_u32::<BigEndian>()?,
                    begin: body.read_u32::<BigEndian>()?,
                    block: payload[9..].to_vec(),
                }
            }
            MESSAGE_CANCEL => {
                if body_len != 12 {
                    return Err(Error::UnexpectedMessageType);
                }
                Message::Cancel {
                    index: body.read_u32::<BigEndian>()?,
                    begin: body.read_u32::<BigEndian>()?,
                    length: body.read_u32::<BigEndian>()?,
                }
            }
            id => return Err(Error::Unsupported(id)),
        };

        Ok(message)
    }

    fn payload_len(&self) -> usize {
        match self {
            Message::KeepAlive
            | Message::Choke
            | Message::Unchoke
            | Message::Interested
            | Message::NotInterested => 0,
            Message::Have(_) => 4,
            Message::Bitfield(bytes) => bytes.len(),
            Message::Request { .. } | Message::Cancel { .. } => 12,
            Message::Piece { block, .. } => 8 + block.len(),
        }
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Message::KeepAlive => "keep-alive",
            Message::Choke => "choke",
            Message::Unchoke => "unchoke",
            Message::Interested => "interested",
            Message::NotInterested => "not interested",
            Message::Have(_) => "have",
            Message::Bitfield(_) => "bitfield",
            Message::Request { .. } => "request",
            Message::Piece { .. } => "piece",
            Message::Cancel { .. } => "cancel",
        }
    }
}
