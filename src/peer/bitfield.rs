use bytes::Bytes;

/// A bitfield advertising which pieces a peer has.
///
/// One bit per piece, numbered from the high bit of the first byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    piece_count: usize,
}

impl Bitfield {
    /// Creates an empty bitfield for the given number of pieces.
    pub fn new(piece_count: usize) -> Self {
        Self {
            bits: vec![0; piece_count.div_ceil(8)],
            piece_count,
        }
    }

    /// Creates a bitfield from the raw bytes of a Bitfield message.
    ///
    /// Short payloads are padded with zeros; extra trailing bytes and spare
    /// trailing bits beyond `piece_count` are dropped.
    pub fn from_bytes(bytes: Bytes, piece_count: usize) -> Self {
        let mut bits = bytes.to_vec();
        bits.resize(piece_count.div_ceil(8), 0);

        let mut bf = Self { bits, piece_count };
        bf.clear_spare_bits();
        bf
    }

    /// Returns true if the peer has the piece at `index`.
    pub fn has(&self, index: usize) -> bool {
        if index >= self.piece_count {
            return false;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        (self.bits[byte_index] >> bit_index) & 1 == 1
    }

    /// Sets the bit for the piece at `index`.
    pub fn set(&mut self, index: usize) {
        if index >= self.piece_count {
            return;
        }
        let byte_index = index / 8;
        let bit_index = 7 - (index % 8);
        self.bits[byte_index] |= 1 << bit_index;
    }

    /// Number of pieces the peer advertises.
    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Total number of pieces the bitfield covers.
    pub fn len(&self) -> usize {
        self.piece_count
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&b| b == 0)
    }

    /// Raw bitfield bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn clear_spare_bits(&mut self) {
        let spare = (self.bits.len() * 8).saturating_sub(self.piece_count);
        if spare > 0 && spare < 8 && !self.bits.is_empty() {
            let mask = 0xFFu8 << spare;
            let last = self.bits.len() - 1;
            self.bits[last] &= mask;
        }
    }
}
