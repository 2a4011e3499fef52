//! Documentation of the "TCP Wire" protocol between Peers in the network.
//! Peers will follow this protocol to exchange information about torrents.
//!
//! A connection starts with a [`Handshake`], framed by [`HandshakeCodec`].
//! Every message after that is framed by [`MessageCodec`].
mod codec;
mod handshake_codec;

pub use codec::*;
pub use handshake_codec::*;

use std::ops::Range;

use crate::error::Error;

/// The default block_len that most clients support, some clients drop
/// the connection on blocks larger than this value.
///
/// Tha last block of a piece might be smallar.
pub const BLOCK_LEN: u32 = 16384;

/// Protocol String
/// String identifier of the string "BitTorrent protocol", in bytes.
pub const PSTR: [u8; 19] = *b"BitTorrent protocol";

/// A Block is a subset of a Piece,
/// pieces are subsets of the entire Torrent data.
///
/// When peers send data to us, they send us Blocks.
/// This happens on the "Piece" message of the peer wire protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    /// The index of the piece this block belongs to.
    pub index: u32,
    /// The zero-based byte offset into the piece.
    pub begin: u32,
    /// The block's data. 16 KiB most of the times,
    /// but the last block of a piece *might* be smaller.
    pub block: bytes::Bytes,
}

impl Block {
    /// Byte range that this block covers inside the piece `index` of `len`
    /// bytes.
    pub fn range(&self, index: u32, len: usize) -> Result<Range<usize>, Error> {
        if self.index != index {
            return Err(Error::UnexpectedPieceIndex {
                expected: index,
                got: self.index,
            });
        }

        let begin = self.begin as usize;

        if begin >= len {
            return Err(Error::OffsetOutOfRange { begin, len });
        }

        let end = begin + self.block.len();

        if end > len {
            return Err(Error::DataOverflowsBuffer {
                begin,
                data_len: self.block.len(),
                len,
            });
        }

        Ok(begin..end)
    }

    /// Copy the data of this block into `piece`, the buffer of the piece
    /// with index `index` that is being downloaded.
    ///
    /// Returns how many bytes were copied. On error `piece` is left
    /// untouched.
    pub fn write_into(&self, index: u32, piece: &mut [u8]) -> Result<usize, Error> {
        let range = self.range(index, piece.len())?;
        piece[range].copy_from_slice(&self.block);

        Ok(self.block.len())
    }
}

/// The representation of a [`Block`].
///
/// When we ask a peer to give us a [`Block`], we send this struct,
/// using the "Request" message of the tcp wire protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlockInfo {
    /// The index of the piece of which this is a block.
    pub index: u32,
    /// The zero-based byte offset into the piece.
    pub begin: u32,
    /// The block's length in bytes. <= 16 KiB
    pub len: u32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self { index: 0, begin: 0, len: BLOCK_LEN }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u32, begin: u32, data: &[u8]) -> Block {
        Block { index, begin, block: bytes::Bytes::copy_from_slice(data) }
    }

    #[test]
    fn write_into_start_of_piece() {
        let mut piece = [0u8; 8];
        let n = block(3, 0, &[1, 2, 3]).write_into(3, &mut piece).unwrap();

        assert_eq!(n, 3);
        assert_eq!(piece, [1, 2, 3, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn write_into_fills_tail_exactly() {
        let mut piece = [0u8; 8];
        let n = block(3, 5, &[7, 8, 9]).write_into(3, &mut piece).unwrap();

        assert_eq!(n, 3);
        assert_eq!(piece, [0, 0, 0, 0, 0, 7, 8, 9]);
    }

    #[test]
    fn write_into_wrong_index() {
        let mut piece = [0u8; 8];
        let r = block(4, 0, &[1, 2, 3]).write_into(3, &mut piece);

        assert!(matches!(
            r,
            Err(Error::UnexpectedPieceIndex { expected: 3, got: 4 })
        ));
        assert_eq!(piece, [0u8; 8]);
    }

    #[test]
    fn write_into_offset_out_of_range() {
        let mut piece = [0u8; 8];

        let r = block(3, 8, &[1]).write_into(3, &mut piece);
        assert!(matches!(r, Err(Error::OffsetOutOfRange { begin: 8, len: 8 })));

        let r = block(3, u32::MAX, &[1]).write_into(3, &mut piece);
        assert!(matches!(r, Err(Error::OffsetOutOfRange { .. })));

        assert_eq!(piece, [0u8; 8]);
    }

    #[test]
    fn write_into_overflow() {
        let mut piece = [0u8; 8];
        let r = block(3, 6, &[1, 2, 3]).write_into(3, &mut piece);

        assert!(matches!(
            r,
            Err(Error::DataOverflowsBuffer { begin: 6, data_len: 3, len: 8 })
        ));
        assert_eq!(piece, [0u8; 8]);
    }
}
