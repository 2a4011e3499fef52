//! Wrapper types around Bitvec.
use bitvec::prelude::*;

/// Bitfield where index = piece.
///
/// The wire layout is most-significant-bit first: piece `i` lives in byte
/// `i / 8` at bit `7 - i % 8`, which is exactly how [`Msb0`] orders bits.
pub type Bitfield = BitVec<u8, Msb0>;

/// Bounds-checked access to a [`Bitfield`].
///
/// Peers may announce piece indices past the end of the torrent, those are
/// silently ignored instead of growing the bitfield or panicking.
pub trait PieceBitfield {
    /// A bitfield of `pieces` bits, all unset.
    fn from_piece(pieces: usize) -> Bitfield {
        bitvec![u8, Msb0; 0; pieces]
    }
    /// Bitfield from the raw payload of a `bitfield` message, its capacity
    /// is the number of bits in the payload.
    fn from_payload(payload: &[u8]) -> Bitfield {
        Bitfield::from_slice(payload)
    }
    fn has_piece(&self, index: usize) -> bool;
    fn set_piece(&mut self, index: usize);
}

impl PieceBitfield for Bitfield {
    fn has_piece(&self, index: usize) -> bool {
        self.get(index).is_some_and(|bit| *bit)
    }

    fn set_piece(&mut self, index: usize) {
        if index < self.len() {
            self.set(index, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_piece() {
        let bitfield = Bitfield::from_piece(1407);
        assert_eq!(bitfield.len(), 1407);
        assert_eq!(bitfield.count_ones(), 0);
    }

    #[test]
    fn set_then_has() {
        let mut bitfield = Bitfield::from_piece(20);

        for i in [0, 7, 8, 19] {
            assert!(!bitfield.has_piece(i));
            bitfield.set_piece(i);
            assert!(bitfield.has_piece(i));
        }

        assert_eq!(bitfield.count_ones(), 4);
    }

    #[test]
    fn out_of_range() {
        let mut bitfield = Bitfield::from_payload(&[0xff]);
        assert_eq!(bitfield.len(), 8);

        assert!(!bitfield.has_piece(8));
        assert!(!bitfield.has_piece(usize::MAX));

        bitfield.set_piece(8);
        bitfield.set_piece(1_000_000);

        assert_eq!(bitfield.len(), 8);
        assert_eq!(bitfield.as_raw_slice(), &[0xff]);
    }

    #[test]
    fn msb_first_layout() {
        // `0b1100_0001` means we have pieces 0, 1, and 7.
        let bitfield = Bitfield::from_payload(&[0b1100_0001, 0b1000_0000]);

        let have: Vec<usize> = (0..16).filter(|i| bitfield.has_piece(*i)).collect();
        assert_eq!(have, vec![0, 1, 7, 8]);

        let mut bitfield = Bitfield::from_piece(16);
        bitfield.set_piece(9);
        assert_eq!(bitfield.as_raw_slice(), &[0, 0b0100_0000]);
    }
}
