//! # Piece Bitfield
//!
//! Big-endian bit-addressed vector of the pieces a peer advertises.
//! Piece `i` lives in byte `i / 8` at bit `7 - (i % 8)`, so piece 0 is
//! the most significant bit of the first byte.

/// The pieces a remote peer claims to have.
///
/// Received whole in a `bitfield` message and accreted afterwards from
/// `have` messages. The length is fixed at construction; out-of-range
/// queries answer `false` and out-of-range updates are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitfield {
    inner: Vec<u8>,
}

impl Bitfield {
    /// An all-zero bitfield sized for `n_pieces` pieces.
    pub fn new(n_pieces: usize) -> Bitfield {
        Bitfield {
            inner: vec![0; n_pieces.div_ceil(8)],
        }
    }

    /// Whether the peer has piece `index`.
    pub fn has(&self, index: u32) -> bool {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if byte_index < self.inner.len() {
            return self.inner[byte_index] >> (7 - offset) & 1 != 0;
        }
        false
    }

    /// Mark piece `index` as available. Out-of-range indices are ignored.
    pub fn set(&mut self, index: u32) {
        let byte_index = (index / 8) as usize;
        let offset = index % 8;

        if byte_index < self.inner.len() {
            self.inner[byte_index] |= 1 << (7 - offset);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl From<Vec<u8>> for Bitfield {
    fn from(inner: Vec<u8>) -> Bitfield {
        Bitfield { inner }
    }
}
