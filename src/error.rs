//! # Error Taxonomy
//!
//! All failures the download engine can produce, as one matchable enum.
//! Workers route on these kinds: severe transport errors tear down the
//! peer connection, everything else recycles the current piece and
//! keeps the connection alive.

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The metainfo path does not end in `.torrent`.
    #[error("file is not a .torrent file")]
    WrongFormat,

    /// The metainfo or tracker response is not valid bencode, or does
    /// not match the expected schema.
    #[error("malformed bencode: {0}")]
    MalformedBencode(#[from] serde_bencode::Error),

    /// The metainfo `pieces` blob is empty.
    #[error("torrent has no pieces")]
    EmptyPieces,

    /// The metainfo `pieces` blob is not a whole number of SHA-1 hashes.
    #[error("pieces blob is not a multiple of 20 bytes")]
    PiecesNotMultipleOf20,

    /// The compact peer list length is not a multiple of 6.
    #[error("received invalid compact peer list from tracker")]
    MalformedPeerList,

    /// The peer's handshake is not a 68-byte BitTorrent v1 handshake.
    #[error("received invalid handshake from peer")]
    BadHandshake,

    /// The info hash in the peer's handshake is not ours.
    #[error("info hash received from peer does not match")]
    IncorrectHash,

    /// A `piece` frame carried an index we did not request.
    #[error("received block for an unexpected piece")]
    IncorrectIndex,

    /// A `piece` frame carried a block outside the piece bounds.
    #[error("received block outside the bounds of its piece")]
    IncorrectOffset,

    /// The tracker answered with a non-200 status or a failure reason.
    #[error("tracker rejected the announce: {0}")]
    TrackerRejected(String),

    #[error("connection refused by peer")]
    ConnectionRefused,

    #[error("connection reset by peer")]
    ConnectionReset,

    /// The peer closed the stream in the middle of a frame.
    #[error("unexpected end of stream")]
    EndOfStream,

    /// An unknown message id; the frame was consumed and can be skipped.
    #[error("unsupported message id {0}")]
    Unsupported(u8),

    /// A known message with a payload that does not fit its type.
    #[error("received message with invalid payload")]
    UnexpectedMessageType,

    /// The piece buffer could not be allocated.
    #[error("could not allocate piece buffer")]
    OutOfMemory,

    /// Every worker exited while pieces were still pending.
    #[error("download stalled: all workers exited with pieces pending")]
    StalledDownload,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Classify a socket error into the transport taxonomy.
    pub fn from_socket(e: io::Error) -> Error {
        match e.kind() {
            io::ErrorKind::ConnectionRefused => Error::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Error::ConnectionReset,
            io::ErrorKind::UnexpectedEof => Error::EndOfStream,
            _ => Error::Io(e),
        }
    }

    /// True when the peer connection is beyond recovery and the worker
    /// holding it must tear it down.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionRefused
                | Error::ConnectionReset
                | Error::EndOfStream
                | Error::BadHandshake
                | Error::IncorrectHash
                | Error::IncorrectIndex
                | Error::IncorrectOffset
                | Error::UnexpectedMessageType
                | Error::OutOfMemory
                | Error::Io(_)
        )
    }
}
